// Entity registry: typed records → entities indexed by id and by kind.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::DuplicatePolicy;
use crate::error::IngestError;
use crate::ingest::EntityRecord;
use crate::progress::{Batches, ProgressReporter};
use crate::types::{Entity, EntityIdx, EntityKind};

/// What happened to a record passed to [`EntityRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added(EntityIdx),
    /// An entity with the same id existed and was replaced in place.
    Replaced(EntityIdx),
    /// The record carried no usable id.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub registered: usize,
    pub replaced: usize,
    pub dropped: usize,
}

/// O(1) lookup of entities by id, plus per-kind listings in registration order.
#[derive(Debug, Default, Clone)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    index: HashMap<String, EntityIdx>,
    by_kind: [Vec<EntityIdx>; 5],
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every record, reporting progress once per `chunk_size` records.
    pub fn from_records(
        records: impl IntoIterator<Item = EntityRecord>,
        policy: DuplicatePolicy,
        chunk_size: usize,
        reporter: &dyn ProgressReporter,
    ) -> Result<(Self, RegistryStats), IngestError> {
        let records: Vec<EntityRecord> = records.into_iter().collect();
        let mut registry = Self::new();
        let mut stats = RegistryStats::default();
        let mut batches =
            Batches::start(reporter, "registering entities", records.len(), chunk_size);

        for record in records {
            match registry.register(record, policy)? {
                Registration::Added(_) => stats.registered += 1,
                Registration::Replaced(_) => stats.replaced += 1,
                Registration::Dropped => stats.dropped += 1,
            }
            batches.tick();
        }
        batches.finish();

        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "Dropped records without any usable id");
        }
        Ok((registry, stats))
    }

    pub fn register(
        &mut self,
        record: EntityRecord,
        policy: DuplicatePolicy,
    ) -> Result<Registration, IngestError> {
        let Some(id) = record.id else {
            debug!(kind = %record.kind, "Record has no id, name or kind id");
            return Ok(Registration::Dropped);
        };
        let name = record.name.unwrap_or_else(|| id.clone());
        let entity = Entity {
            id: id.clone(),
            name,
            kind: record.kind,
            links: record.links,
        };

        if let Some(&idx) = self.index.get(&id) {
            let previous = self.entities[idx.0].kind;
            if policy == DuplicatePolicy::Reject {
                return Err(IngestError::DuplicateId {
                    id,
                    first: previous.to_string(),
                    second: entity.kind.to_string(),
                });
            }
            debug!(id = %id, "Duplicate id, last record wins");
            if previous != entity.kind {
                self.by_kind[kind_slot(previous)].retain(|&i| i != idx);
                self.by_kind[kind_slot(entity.kind)].push(idx);
            }
            self.entities[idx.0] = entity;
            return Ok(Registration::Replaced(idx));
        }

        let idx = EntityIdx(self.entities.len());
        self.by_kind[kind_slot(entity.kind)].push(idx);
        self.index.insert(id, idx);
        self.entities.push(entity);
        Ok(Registration::Added(idx))
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|idx| &self.entities[idx.0])
    }

    pub fn idx(&self, id: &str) -> Option<EntityIdx> {
        self.index.get(id).copied()
    }

    /// # Panics
    /// If `idx` was not produced by this registry.
    pub fn entity(&self, idx: EntityIdx) -> &Entity {
        &self.entities[idx.0]
    }

    /// Entities of one kind in registration order.
    pub fn of_kind(&self, kind: EntityKind) -> &[EntityIdx] {
        &self.by_kind[kind_slot(kind)]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityIdx, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityIdx(i), e))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn kind_slot(kind: EntityKind) -> usize {
    usize::from(kind.level())
}
