//! Provenance Store
//!
//! SQLite record of executions and everything attached to them: inputs,
//! container images, agent runs, ACMG evidence, artifacts and audit notes.
//! Every write is a single transaction; child rows are refused unless their
//! execution exists.

pub mod models;
pub mod queries;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::database::models::*;
use crate::database::queries::Queries;
use crate::database::schema::PROVENANCE_SCHEMA;
use crate::error::ProvenanceError;

#[derive(Clone)]
pub struct ProvenanceStore {
    pool: SqlitePool,
}

impl ProvenanceStore {
    /// Open (creating if needed) the store at `path` and ensure the schema.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, ProvenanceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ProvenanceError::io_context("Failed to create database directory", e)
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = ProvenanceStore { pool };
        store.run_migrations().await?;
        info!("Provenance store ready at {}", path.display());
        Ok(store)
    }

    /// Private in-memory store. A single pinned connection keeps the
    /// database alive for the lifetime of the pool.
    pub async fn new_in_memory() -> Result<Self, ProvenanceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = ProvenanceStore { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the schema. Safe to call on every start.
    pub async fn run_migrations(&self) -> Result<(), ProvenanceError> {
        sqlx::raw_sql(PROVENANCE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create_execution(&self, execution: &NewExecution) -> Result<(), ProvenanceError> {
        if execution.id.trim().is_empty() {
            return Err(ProvenanceError::ValidationError(
                "execution id must not be empty".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        if Queries::execution_exists(&mut tx, &execution.id).await? {
            return Err(ProvenanceError::DuplicateExecutionError(execution.id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO executions
                (id, command, workflow, agent, model, status, start_time, container_digest, input_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution.id.as_str())
        .bind(execution.command.as_str())
        .bind(execution.workflow.as_deref())
        .bind(execution.agent.as_deref())
        .bind(execution.model.as_deref())
        .bind(execution.status.as_str())
        .bind(execution.start_time.as_str())
        .bind(execution.container_digest.as_deref())
        .bind(execution.input_hash.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ProvenanceError::DuplicateExecutionError(execution.id.clone())
            }
            other => other.into(),
        })?;

        tx.commit().await?;
        debug!("Created execution {} ({})", execution.id, execution.status);
        Ok(())
    }

    /// Record the terminal state of an execution.
    ///
    /// Repeating the exact same finish is a no-op; finishing again with
    /// different values is refused.
    pub async fn finish_execution(
        &self,
        execution_id: &str,
        finish: &ExecutionFinish,
    ) -> Result<(), ProvenanceError> {
        let mut tx = self.pool.begin().await?;
        let current = Queries::get_execution(&mut tx, execution_id)
            .await?
            .ok_or_else(|| ProvenanceError::ExecutionNotFoundError(execution_id.to_string()))?;

        if current.is_finished() {
            if finish.matches(&current) {
                debug!("Execution {} already finished with identical values", execution_id);
                return Ok(());
            }
            warn!(
                "Refusing to re-finish execution {} (status {})",
                execution_id, current.status
            );
            return Err(ProvenanceError::AlreadyFinishedError(execution_id.to_string()));
        }

        let updated = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, end_time = ?, output_hash = ?, exit_code = ?
            WHERE id = ? AND end_time IS NULL
            "#,
        )
        .bind(finish.status.as_str())
        .bind(finish.end_time.as_str())
        .bind(finish.output_hash.as_deref())
        .bind(finish.exit_code)
        .bind(execution_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(ProvenanceError::AlreadyFinishedError(execution_id.to_string()));
        }

        tx.commit().await?;
        info!("Execution {} finished: {}", execution_id, finish.status);
        Ok(())
    }

    /// Attach one child record to an execution, returning its row id.
    pub async fn insert_child(
        &self,
        execution_id: &str,
        record: &ChildRecord,
    ) -> Result<i64, ProvenanceError> {
        record.validate()?;

        let mut tx = self.pool.begin().await?;
        if !Queries::execution_exists(&mut tx, execution_id).await? {
            warn!(
                "Rejected {} row for unknown execution {}",
                record.kind().table(),
                execution_id
            );
            return Err(ProvenanceError::DanglingReferenceError(execution_id.to_string()));
        }

        let query = match record {
            ChildRecord::Input(input) => sqlx::query(
                "INSERT INTO inputs (execution_id, file_path, sha256, size_bytes) VALUES (?, ?, ?, ?)",
            )
            .bind(execution_id)
            .bind(input.file_path.as_str())
            .bind(input.sha256.as_str())
            .bind(input.size_bytes),
            ChildRecord::Container(container) => sqlx::query(
                "INSERT INTO containers (execution_id, image_name, image_digest, runtime, version) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(execution_id)
            .bind(container.image_name.as_str())
            .bind(container.image_digest.as_deref())
            .bind(container.runtime.as_str())
            .bind(container.version.as_deref()),
            ChildRecord::AgentRun(run) => sqlx::query(
                r#"
                INSERT INTO agents
                    (execution_id, agent_name, model, reasoning, confidence, execution_time_ms, raw_output)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(execution_id)
            .bind(run.agent_name.as_str())
            .bind(run.model.as_str())
            .bind(run.reasoning.as_str())
            .bind(run.confidence)
            .bind(run.execution_time_ms)
            .bind(run.raw_output.as_str()),
            ChildRecord::EvidenceRow(evidence) => sqlx::query(
                "INSERT INTO acmg_evidence (execution_id, rule_code, triggered, strength, explanation) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(execution_id)
            .bind(evidence.rule_code.as_str())
            .bind(evidence.triggered)
            .bind(evidence.strength.as_str())
            .bind(evidence.explanation.as_str()),
            ChildRecord::Artifact(artifact) => sqlx::query(
                "INSERT INTO artifacts (execution_id, artifact_type, path, sha256) VALUES (?, ?, ?, ?)",
            )
            .bind(execution_id)
            .bind(artifact.artifact_type.as_str())
            .bind(artifact.path.as_str())
            .bind(artifact.sha256.as_str()),
            ChildRecord::AuditNote(note) => sqlx::query(
                "INSERT INTO audit_events (execution_id, event_type, message) VALUES (?, ?, ?)",
            )
            .bind(execution_id)
            .bind(note.event_type.as_str())
            .bind(note.message.as_str()),
        };

        let result = query.execute(&mut *tx).await.map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                ProvenanceError::DanglingReferenceError(execution_id.to_string())
            }
            other => other.into(),
        })?;

        tx.commit().await?;
        let row_id = result.last_insert_rowid();
        debug!(
            "Inserted {} row {} for execution {}",
            record.kind().table(),
            row_id,
            execution_id
        );
        Ok(row_id)
    }

    pub async fn insert_input(
        &self,
        execution_id: &str,
        input: InputRecord,
    ) -> Result<i64, ProvenanceError> {
        self.insert_child(execution_id, &ChildRecord::Input(input)).await
    }

    pub async fn insert_container(
        &self,
        execution_id: &str,
        container: ContainerRecord,
    ) -> Result<i64, ProvenanceError> {
        self.insert_child(execution_id, &ChildRecord::Container(container))
            .await
    }

    pub async fn insert_agent_run(
        &self,
        execution_id: &str,
        run: AgentRunRecord,
    ) -> Result<i64, ProvenanceError> {
        self.insert_child(execution_id, &ChildRecord::AgentRun(run)).await
    }

    pub async fn insert_evidence_row(
        &self,
        execution_id: &str,
        evidence: EvidenceRow,
    ) -> Result<i64, ProvenanceError> {
        self.insert_child(execution_id, &ChildRecord::EvidenceRow(evidence))
            .await
    }

    pub async fn insert_artifact(
        &self,
        execution_id: &str,
        artifact: ArtifactRecord,
    ) -> Result<i64, ProvenanceError> {
        self.insert_child(execution_id, &ChildRecord::Artifact(artifact))
            .await
    }

    pub async fn insert_audit_note(
        &self,
        execution_id: &str,
        event_type: &str,
        message: &str,
    ) -> Result<i64, ProvenanceError> {
        self.insert_child(
            execution_id,
            &ChildRecord::AuditNote(AuditNote::new(event_type, message)),
        )
        .await
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<Execution, ProvenanceError> {
        let mut conn = self.pool.acquire().await?;
        Queries::get_execution(&mut conn, execution_id)
            .await?
            .ok_or_else(|| ProvenanceError::ExecutionNotFoundError(execution_id.to_string()))
    }

    /// Read an execution and all of its child rows in one transaction.
    pub async fn get_execution_bundle(
        &self,
        execution_id: &str,
    ) -> Result<ExecutionBundle, ProvenanceError> {
        let mut tx = self.pool.begin().await?;
        let execution = Queries::get_execution(&mut tx, execution_id)
            .await?
            .ok_or_else(|| ProvenanceError::ExecutionNotFoundError(execution_id.to_string()))?;

        let bundle = ExecutionBundle {
            execution,
            inputs: Queries::get_children(&mut tx, ChildKind::Input, execution_id).await?,
            containers: Queries::get_children(&mut tx, ChildKind::Container, execution_id).await?,
            agents: Queries::get_children(&mut tx, ChildKind::AgentRun, execution_id).await?,
            acmg_evidence: Queries::get_children(&mut tx, ChildKind::EvidenceRow, execution_id)
                .await?,
            artifacts: Queries::get_children(&mut tx, ChildKind::Artifact, execution_id).await?,
            audit_events: Queries::get_children(&mut tx, ChildKind::AuditNote, execution_id)
                .await?,
        };

        tx.commit().await?;
        Ok(bundle)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
