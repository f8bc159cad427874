use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;

use strata_test::TestAnalysis;

fn strata() -> Command {
    let mut cmd = Command::cargo_bin("strata").expect("binary builds");
    cmd.env_remove("STRATA_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn tree_prints_indented_forest_with_badges() {
    let fixture = TestAnalysis::shop();
    strata()
        .arg("tree")
        .arg(fixture.analysis())
        .arg("--cycles")
        .arg(fixture.cycles())
        .assert()
        .success()
        .stdout(predicate::str::contains("package lib\n"))
        .stdout(predicate::str::contains("  module shop.cart [cycle: high]"))
        .stdout(predicate::str::contains("      method add"));
}

#[test]
fn project_json_replaces_root_package_with_proxy() {
    let fixture = TestAnalysis::shop();
    let output = strata()
        .args(["project", "--format", "json", "--level", "0", "--config"])
        .arg(fixture.config())
        .arg(fixture.analysis())
        .output()
        .unwrap();
    assert!(output.status.success());

    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = view["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["pkg:lib", "root:shop"]);
    assert_eq!(view["level"], json!("package"));
}

#[test]
fn project_dot_highlights_cycle_edges() {
    let fixture = TestAnalysis::shop();
    strata()
        .args(["project", "--format", "dot", "--level", "module", "--cycles"])
        .arg(fixture.cycles())
        .arg(fixture.analysis())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains("color=red, penwidth=2"));
}

#[test]
fn project_expand_reveals_members() {
    let fixture = TestAnalysis::shop();
    strata()
        .args(["project", "--level", "class", "--expand", "cls:Cart"])
        .arg(fixture.analysis())
        .assert()
        .success()
        .stdout(predicate::str::contains("method add"))
        .stdout(predicate::str::contains("method pay").not());
}

#[test]
fn cycles_lists_flagged_entities() {
    let fixture = TestAnalysis::shop();
    strata()
        .arg("cycles")
        .arg(fixture.analysis())
        .arg("--cycles")
        .arg(fixture.cycles())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 cycles (1 high, 0 medium, 0 low), 2 entities flagged"))
        .stdout(predicate::str::contains("mod:lib.util"));
}

#[test]
fn check_strict_fails_on_dropped_records() {
    let fixture = TestAnalysis::write(
        &json!({"packages": [{"id": "p"}], "modules": [{"name": ""}]}),
        &json!({"cycles": []}),
        None,
    );
    strata().arg("check").arg(fixture.analysis()).assert().success();
    strata()
        .args(["check", "--strict"])
        .arg(fixture.analysis())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Check failed"));
}

#[test]
fn missing_input_exits_with_code_3() {
    let dir = tempfile::tempdir().unwrap();
    strata()
        .arg("tree")
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Cannot read analysis"));
}

#[test]
fn malformed_input_exits_with_code_4() {
    let fixture = TestAnalysis::malformed();
    strata().arg("tree").arg(fixture.analysis()).assert().code(4);
}

#[test]
fn invalid_config_exits_with_code_2() {
    let fixture = TestAnalysis::write(
        &json!({"packages": []}),
        &json!([]),
        Some("[processing]\nchunk_size = 0\n"),
    );
    strata()
        .arg("check")
        .arg("--config")
        .arg(fixture.config())
        .arg(fixture.analysis())
        .assert()
        .code(2);
}

#[test]
fn bad_level_is_a_usage_error() {
    let fixture = TestAnalysis::shop();
    strata()
        .args(["project", "--level", "9"])
        .arg(fixture.analysis())
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}
