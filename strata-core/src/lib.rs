//! Strata core library: hierarchical composition of code dependency graphs.
//!
//! The main entry point is [`composer::Composer`], which turns an analysis
//! result (packages, modules, classes, methods, fields and their
//! relationships) plus an external cycle report into an ordered containment
//! forest, then serves level-bounded projections of it:
//!
//! Ingest → Registry → Resolve → Forest → Order → Cycles → Project.

pub mod composer;
pub mod config;
pub mod cycles;
pub mod error;
pub mod forest;
pub mod ingest;
pub mod order;
pub mod progress;
pub mod project;
pub mod registry;
pub mod resolve;
pub mod types;
