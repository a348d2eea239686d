//! Integration tests for Trellis
//!
//! These run the whole pipeline, and the binary, over a small Tableau workbook.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trellis_classify::{RuleCatalog, RulesClassifier};
use trellis_core::{AnalysisSnapshot, ComplexityLevel, WarningKind};
use trellis_indexer::{PlatformSchema, SchemaParser};
use trellis_runner::{Pipeline, RunConfig};

const SUPERSTORE: &str = include_str!("../fixtures/superstore.twb");

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/superstore.twb")
}

async fn analyze_superstore() -> AnalysisSnapshot {
    let mut config = RunConfig::default();
    config.cache.enabled = false;
    let schema = PlatformSchema::tableau().unwrap();
    let parser = SchemaParser::new(&schema).unwrap();
    let pipeline = Pipeline::new(
        config,
        schema,
        RuleCatalog::tableau().unwrap(),
        Arc::new(parser),
        Arc::new(RulesClassifier::new()),
    );
    pipeline
        .analyze(SUPERSTORE.as_bytes().to_vec(), &CancellationToken::new())
        .await
        .unwrap()
        .snapshot
}

#[tokio::test]
async fn test_superstore_components() {
    let snapshot = analyze_superstore().await;
    assert!(snapshot.complete);
    assert_eq!(snapshot.platform, "tableau");
    assert_eq!(snapshot.units.len(), 5);
    assert_eq!(snapshot.components.len(), 15);

    // Reference copies inside worksheet views are not definitions.
    let regional = snapshot.component("[Calculation_regional]").unwrap();
    assert_eq!(regional.display_name, "Regional Sales");
    assert_eq!(regional.seen_in_units.len(), 1);

    let ds = snapshot.component("ds-superstore").unwrap();
    assert_eq!(ds.display_name, "Superstore");
    assert_eq!(ds.own_complexity, Some(ComplexityLevel::Medium));
}

#[tokio::test]
async fn test_superstore_container_rollup() {
    let snapshot = analyze_superstore().await;

    let exec = snapshot.aggregate("dash-exec").unwrap();
    assert_eq!(exec.own_complexity, ComplexityLevel::Low);
    assert_eq!(exec.effective_complexity, ComplexityLevel::High);
    assert_eq!(exec.decisive_id, "ws-map");

    let trend = snapshot.aggregate("ws-trend").unwrap();
    assert_eq!(trend.effective_complexity, ComplexityLevel::Medium);
    assert_eq!(trend.decisive_id, "ds-superstore");

    let running = snapshot.aggregate("[Calculation_running]").unwrap();
    assert_eq!(running.effective_complexity, ComplexityLevel::High);
}

#[tokio::test]
async fn test_superstore_dangling_references() {
    let snapshot = analyze_superstore().await;

    let dangling: Vec<&str> = snapshot.dangling_edges().map(|e| e.to_id.as_str()).collect();
    assert_eq!(dangling.len(), 2);
    assert!(dangling.contains(&"unresolved:Retired Sheet"));
    assert!(dangling.contains(&"ds-returns"));

    let returns = snapshot.aggregate("dash-returns").unwrap();
    assert_eq!(returns.effective_complexity, ComplexityLevel::Medium);
    assert_eq!(returns.decisive_id, "dash-returns");
    assert!(returns.unresolved_ids.contains("unresolved:Retired Sheet"));
    assert!(returns.unresolved_ids.contains("ds-returns"));

    let subjects: Vec<&str> = snapshot
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::UnresolvedReference)
        .map(|w| w.subject.as_str())
        .collect();
    assert!(subjects.contains(&"Retired Sheet"));
    assert!(subjects.contains(&"ds-returns"));
}

#[tokio::test]
async fn test_superstore_calculation_cycle() {
    let snapshot = analyze_superstore().await;

    assert_eq!(
        snapshot.cycles,
        vec![vec!["[Calculation_a]".to_string(), "[Calculation_b]".to_string()]]
    );
    let a = snapshot.aggregate("[Calculation_a]").unwrap();
    let b = snapshot.aggregate("[Calculation_b]").unwrap();
    assert!(a.in_cycle && b.in_cycle);
    assert_eq!(a.effective_complexity, ComplexityLevel::Medium);
    assert_eq!(b.effective_complexity, a.effective_complexity);
}

#[tokio::test]
async fn test_snapshot_is_reproducible() {
    let first = analyze_superstore().await;
    let second = analyze_superstore().await;
    assert_eq!(first.components, second.components);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.aggregates, second.aggregates);
    assert_eq!(first.warnings, second.warnings);
    assert_eq!(first.document_hash, second.document_hash);
}

// ── Binary ──────────────────────────────────────────────────

fn trellis() -> Command {
    Command::new(env!("CARGO_BIN_EXE_trellis"))
}

#[test]
fn test_cli_help() {
    let output = trellis().arg("--help").output().expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("trellis"));
    assert!(stdout.contains("analyze"));
}

#[test]
fn test_cli_split_lists_units() {
    let root = tempfile::tempdir().unwrap();
    let output = trellis()
        .arg("--root")
        .arg(root.path())
        .arg("split")
        .arg(fixture_path())
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].contains("workbook/preferences[1]"));
    assert!(lines[3].contains("workbook/dashboards[4]"));
    assert!(lines.iter().all(|l| l.contains(" ok ")));
}

#[test]
fn test_cli_analyze_writes_snapshot_and_cache() {
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("snapshot.json");
    let status = trellis()
        .arg("--root")
        .arg(root.path())
        .arg("analyze")
        .arg(fixture_path())
        .arg("--output")
        .arg(&out)
        .status()
        .expect("Failed to execute command");
    assert!(status.success());

    let snapshot: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(snapshot["complete"], true);
    let exec = snapshot["aggregates"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["component_id"] == "dash-exec")
        .unwrap();
    assert_eq!(exec["effective_complexity"], "high");
    assert!(root.path().join(".trellis/snapshots").is_dir());

    let status = trellis()
        .arg("--root")
        .arg(root.path())
        .arg("clear")
        .status()
        .expect("Failed to execute command");
    assert!(status.success());
    assert!(!root.path().join(".trellis").exists());
}

#[test]
fn test_cli_rejects_empty_document() {
    let root = tempfile::tempdir().unwrap();
    let empty = root.path().join("empty.twb");
    std::fs::write(&empty, "   \n").unwrap();
    let output = trellis()
        .arg("--root")
        .arg(root.path())
        .arg("analyze")
        .arg(&empty)
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
}
