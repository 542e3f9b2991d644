//! Provenance store lifecycle and integrity tests

use helixsh_audit::database::models::*;
use helixsh_audit::database::ProvenanceStore;
use helixsh_audit::error::ProvenanceError;
use tempfile::tempdir;

mod common;
use common::*;

#[tokio::test]
async fn test_execution_lifecycle() {
    let store = setup_test_store().await;

    store.create_execution(&test_execution("e1")).await.unwrap();
    store
        .insert_audit_note("e1", "execution_started", "started")
        .await
        .unwrap();
    store
        .finish_execution("e1", &test_finish(STATUS_COMPLETED, 0))
        .await
        .unwrap();

    let bundle = store.get_execution_bundle("e1").await.unwrap();
    assert_eq!(bundle.execution.status, "completed");
    assert_eq!(bundle.execution.exit_code, Some(0));
    assert_eq!(bundle.execution.input_hash, "hash");
    assert_eq!(bundle.execution.end_time.as_deref(), Some("2026-01-01T00:10:00Z"));
    assert_eq!(bundle.execution.output_hash.as_deref(), Some("out"));
    assert_eq!(bundle.audit_events.len(), 1);
    assert_eq!(bundle.audit_events[0].record.event_type, "execution_started");
    assert!(bundle.audit_events[0].record.timestamp.is_some());
}

#[tokio::test]
async fn test_new_execution_is_unfinished() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();

    let execution = store.get_execution("e1").await.unwrap();
    assert_eq!(execution.status, STATUS_RUNNING);
    assert!(!execution.is_finished());
    assert!(execution.output_hash.is_none());
    assert!(execution.exit_code.is_none());
}

#[tokio::test]
async fn test_input_round_trip() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();
    store.insert_input("e1", test_input("reads.fastq")).await.unwrap();

    let bundle = store.get_execution_bundle("e1").await.unwrap();
    assert_eq!(bundle.inputs.len(), 1);
    assert_eq!(bundle.inputs[0].execution_id, "e1");
    assert_eq!(bundle.inputs[0].record, test_input("reads.fastq"));
}

#[tokio::test]
async fn test_children_keep_insertion_order_and_scope() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();
    store.create_execution(&test_execution("e2")).await.unwrap();

    store.insert_input("e1", test_input("a.fastq")).await.unwrap();
    store.insert_input("e2", test_input("other.fastq")).await.unwrap();
    store.insert_input("e1", test_input("b.fastq")).await.unwrap();
    store.insert_input("e1", test_input("c.fastq")).await.unwrap();

    let bundle = store.get_execution_bundle("e1").await.unwrap();
    let paths: Vec<&str> = bundle
        .inputs
        .iter()
        .map(|row| row.record.file_path.as_str())
        .collect();
    assert_eq!(paths, vec!["data/a.fastq", "data/b.fastq", "data/c.fastq"]);
    assert!(bundle.inputs.windows(2).all(|pair| pair[0].id < pair[1].id));
    assert!(bundle.inputs.iter().all(|row| row.execution_id == "e1"));
}

#[tokio::test]
async fn test_every_child_kind_is_bundled() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();

    store.insert_input("e1", test_input("reads.fastq")).await.unwrap();
    store
        .insert_container(
            "e1",
            ContainerRecord {
                image_name: "ghcr.io/nf-core/rnaseq".to_string(),
                image_digest: Some("sha256:abc".to_string()),
                runtime: "docker".to_string(),
                version: None,
            },
        )
        .await
        .unwrap();
    store
        .insert_agent_run("e1", test_agent_run("claude", 0.91))
        .await
        .unwrap();
    store
        .insert_evidence_row(
            "e1",
            EvidenceRow {
                rule_code: "PVS1".to_string(),
                triggered: true,
                strength: "very_strong".to_string(),
                explanation: "Null variant in a gene where LOF is a known mechanism".to_string(),
            },
        )
        .await
        .unwrap();
    store
        .insert_evidence_row(
            "e1",
            EvidenceRow {
                rule_code: "PM2".to_string(),
                triggered: false,
                strength: "moderate".to_string(),
                explanation: "Present in population databases".to_string(),
            },
        )
        .await
        .unwrap();
    store
        .insert_artifact(
            "e1",
            ArtifactRecord {
                artifact_type: "vcf".to_string(),
                path: "results/calls.vcf.gz".to_string(),
                sha256: "def".to_string(),
            },
        )
        .await
        .unwrap();
    store
        .insert_audit_note("e1", "agent_completed", "claude finished")
        .await
        .unwrap();

    let bundle = store.get_execution_bundle("e1").await.unwrap();
    assert_eq!(bundle.inputs.len(), 1);
    assert_eq!(bundle.containers.len(), 1);
    assert_eq!(bundle.containers[0].record.image_digest.as_deref(), Some("sha256:abc"));
    assert_eq!(bundle.containers[0].record.version, None);
    assert_eq!(bundle.agents.len(), 1);
    assert_eq!(bundle.agents[0].record.confidence, 0.91);
    assert_eq!(bundle.acmg_evidence.len(), 2);
    assert!(bundle.acmg_evidence[0].record.triggered);
    assert!(!bundle.acmg_evidence[1].record.triggered);
    assert_eq!(bundle.artifacts.len(), 1);
    assert_eq!(bundle.audit_events.len(), 1);

    let value = serde_json::to_value(&bundle).unwrap();
    for key in [
        "execution",
        "inputs",
        "containers",
        "agents",
        "acmg_evidence",
        "artifacts",
        "audit_events",
    ] {
        assert!(value.get(key).is_some(), "bundle missing {}", key);
    }
    assert_eq!(value["acmg_evidence"][0]["rule_code"], "PVS1");
}

#[tokio::test]
async fn test_duplicate_execution_rejected() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();

    let result = store.create_execution(&test_execution("e1")).await;
    assert!(matches!(
        result,
        Err(ProvenanceError::DuplicateExecutionError(id)) if id == "e1"
    ));
}

#[tokio::test]
async fn test_dangling_references_rejected() {
    let store = setup_test_store().await;

    let result = store.insert_input("does-not-exist", test_input("a.fastq")).await;
    assert!(matches!(result, Err(ProvenanceError::DanglingReferenceError(_))));

    let result = store
        .insert_agent_run("does-not-exist", test_agent_run("codex", 0.5))
        .await;
    assert!(matches!(result, Err(ProvenanceError::DanglingReferenceError(_))));

    let result = store
        .insert_audit_note("does-not-exist", "note", "orphan")
        .await;
    assert!(matches!(result, Err(ProvenanceError::DanglingReferenceError(_))));
}

#[tokio::test]
async fn test_finish_missing_execution() {
    let store = setup_test_store().await;
    let result = store
        .finish_execution("missing", &test_finish(STATUS_FAILED, 1))
        .await;
    assert!(matches!(result, Err(ProvenanceError::ExecutionNotFoundError(_))));
}

#[tokio::test]
async fn test_bundle_for_missing_execution() {
    let store = setup_test_store().await;
    let result = store.get_execution_bundle("missing").await;
    assert!(matches!(result, Err(ProvenanceError::ExecutionNotFoundError(_))));
}

#[tokio::test]
async fn test_refinish_rules() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();
    store
        .finish_execution("e1", &test_finish(STATUS_COMPLETED, 0))
        .await
        .unwrap();

    // Identical retry is accepted.
    store
        .finish_execution("e1", &test_finish(STATUS_COMPLETED, 0))
        .await
        .unwrap();

    let result = store
        .finish_execution("e1", &test_finish(STATUS_FAILED, 137))
        .await;
    assert!(matches!(result, Err(ProvenanceError::AlreadyFinishedError(_))));

    let execution = store.get_execution("e1").await.unwrap();
    assert_eq!(execution.status, STATUS_COMPLETED);
    assert_eq!(execution.exit_code, Some(0));
}

#[tokio::test]
async fn test_invalid_child_leaves_no_row() {
    let store = setup_test_store().await;
    store.create_execution(&test_execution("e1")).await.unwrap();

    let result = store.insert_agent_run("e1", test_agent_run("claude", 1.5)).await;
    assert!(matches!(result, Err(ProvenanceError::ValidationError(_))));

    let bundle = store.get_execution_bundle("e1").await.unwrap();
    assert!(bundle.agents.is_empty());
}

#[tokio::test]
async fn test_file_store_reopens_with_data() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("nested/provenance.sqlite");

    {
        let store = ProvenanceStore::open(&path).await.unwrap();
        store.create_execution(&test_execution("e1")).await.unwrap();
        store.insert_input("e1", test_input("reads.fastq")).await.unwrap();
        store.close().await;
    }

    // Opening again re-applies the schema without touching existing rows.
    let store = ProvenanceStore::open(&path).await.unwrap();
    let bundle = store.get_execution_bundle("e1").await.unwrap();
    assert_eq!(bundle.inputs.len(), 1);
}
