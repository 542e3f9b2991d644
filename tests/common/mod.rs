#![allow(dead_code)]

use helixsh_audit::database::models::*;
use helixsh_audit::database::ProvenanceStore;

/// Setup an in-memory SQLite store for testing
pub async fn setup_test_store() -> ProvenanceStore {
    ProvenanceStore::new_in_memory()
        .await
        .expect("Failed to create test store")
}

/// A running execution with fixed, comparable timestamps
pub fn test_execution(id: &str) -> NewExecution {
    NewExecution {
        id: id.to_string(),
        command: "nextflow run nf-core/rnaseq -profile docker".to_string(),
        workflow: Some("nf-core/rnaseq".to_string()),
        agent: Some("claude".to_string()),
        model: Some("opus".to_string()),
        status: STATUS_RUNNING.to_string(),
        start_time: "2026-01-01T00:00:00Z".to_string(),
        container_digest: Some("sha256:abc".to_string()),
        input_hash: "hash".to_string(),
    }
}

pub fn test_finish(status: &str, exit_code: i64) -> ExecutionFinish {
    ExecutionFinish {
        status: status.to_string(),
        end_time: "2026-01-01T00:10:00Z".to_string(),
        output_hash: Some("out".to_string()),
        exit_code: Some(exit_code),
    }
}

pub fn test_input(name: &str) -> InputRecord {
    InputRecord {
        file_path: format!("data/{}", name),
        sha256: format!("sha-{}", name),
        size_bytes: 1024,
    }
}

pub fn test_agent_run(agent: &str, confidence: f64) -> AgentRunRecord {
    AgentRunRecord {
        agent_name: agent.to_string(),
        model: "opus-4".to_string(),
        reasoning: "Frameshift in BRCA1 supports PVS1".to_string(),
        confidence,
        execution_time_ms: 1500,
        raw_output: "{\"classification\":\"Pathogenic\"}".to_string(),
    }
}
