use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::error::ProvenanceError;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Execution {
    pub id: String,
    pub command: String,
    pub workflow: Option<String>,
    pub agent: Option<String>,
    pub model: Option<String>,
    pub status: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub container_digest: Option<String>,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub exit_code: Option<i64>,
    pub created_at: String,
}

impl Execution {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Fields supplied when an execution is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExecution {
    pub id: String,
    pub command: String,
    pub workflow: Option<String>,
    pub agent: Option<String>,
    pub model: Option<String>,
    pub status: String,
    pub start_time: String,
    pub container_digest: Option<String>,
    pub input_hash: String,
}

impl NewExecution {
    /// A `running` execution starting now.
    pub fn running(id: &str, command: &str, input_hash: &str) -> Self {
        Self {
            id: id.to_string(),
            command: command.to_string(),
            workflow: None,
            agent: None,
            model: None,
            status: STATUS_RUNNING.to_string(),
            start_time: Utc::now().to_rfc3339(),
            container_digest: None,
            input_hash: input_hash.to_string(),
        }
    }

    pub fn with_workflow(mut self, workflow: Option<String>) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_agent(mut self, agent: Option<String>, model: Option<String>) -> Self {
        self.agent = agent;
        self.model = model;
        self
    }

    pub fn with_container_digest(mut self, digest: Option<String>) -> Self {
        self.container_digest = digest;
        self
    }
}

/// Terminal state written once when an execution ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFinish {
    pub status: String,
    pub end_time: String,
    pub output_hash: Option<String>,
    pub exit_code: Option<i64>,
}

impl ExecutionFinish {
    pub fn now(status: &str, output_hash: Option<String>, exit_code: Option<i64>) -> Self {
        Self {
            status: status.to_string(),
            end_time: Utc::now().to_rfc3339(),
            output_hash,
            exit_code,
        }
    }

    pub(crate) fn matches(&self, execution: &Execution) -> bool {
        execution.status == self.status
            && execution.end_time.as_deref() == Some(self.end_time.as_str())
            && execution.output_hash == self.output_hash
            && execution.exit_code == self.exit_code
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InputRecord {
    pub file_path: String,
    pub sha256: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ContainerRecord {
    pub image_name: String,
    pub image_digest: Option<String>,
    pub runtime: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AgentRunRecord {
    pub agent_name: String,
    pub model: String,
    pub reasoning: String,
    pub confidence: f64,
    pub execution_time_ms: i64,
    pub raw_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EvidenceRow {
    pub rule_code: String,
    pub triggered: bool,
    pub strength: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ArtifactRecord {
    pub artifact_type: String,
    pub path: String,
    pub sha256: String,
}

/// Free-form note; `timestamp` is assigned by the store and ignored on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditNote {
    pub event_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl AuditNote {
    pub fn new(event_type: &str, message: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            message: message.to_string(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Input,
    Container,
    AgentRun,
    EvidenceRow,
    Artifact,
    AuditNote,
}

impl ChildKind {
    pub fn table(self) -> &'static str {
        match self {
            ChildKind::Input => "inputs",
            ChildKind::Container => "containers",
            ChildKind::AgentRun => "agents",
            ChildKind::EvidenceRow => "acmg_evidence",
            ChildKind::Artifact => "artifacts",
            ChildKind::AuditNote => "audit_events",
        }
    }
}

/// Any record owned by an execution
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRecord {
    Input(InputRecord),
    Container(ContainerRecord),
    AgentRun(AgentRunRecord),
    EvidenceRow(EvidenceRow),
    Artifact(ArtifactRecord),
    AuditNote(AuditNote),
}

impl ChildRecord {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildRecord::Input(_) => ChildKind::Input,
            ChildRecord::Container(_) => ChildKind::Container,
            ChildRecord::AgentRun(_) => ChildKind::AgentRun,
            ChildRecord::EvidenceRow(_) => ChildKind::EvidenceRow,
            ChildRecord::Artifact(_) => ChildKind::Artifact,
            ChildRecord::AuditNote(_) => ChildKind::AuditNote,
        }
    }

    pub fn validate(&self) -> Result<(), ProvenanceError> {
        match self {
            ChildRecord::Input(input) if input.size_bytes < 0 => Err(
                ProvenanceError::ValidationError(format!(
                    "size_bytes must be non-negative, got {}",
                    input.size_bytes
                )),
            ),
            ChildRecord::AgentRun(run) if !(0.0..=1.0).contains(&run.confidence) => Err(
                ProvenanceError::ValidationError(format!(
                    "confidence must be within 0.0..=1.0, got {}",
                    run.confidence
                )),
            ),
            ChildRecord::AgentRun(run) if run.execution_time_ms < 0 => Err(
                ProvenanceError::ValidationError(format!(
                    "execution_time_ms must be non-negative, got {}",
                    run.execution_time_ms
                )),
            ),
            _ => Ok(()),
        }
    }
}

/// A child row as stored: its insertion sequence, its owner and its fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: i64,
    pub execution_id: String,
    #[serde(flatten)]
    pub record: T,
}

impl<'r, T> FromRow<'r, SqliteRow> for Stored<T>
where
    T: FromRow<'r, SqliteRow>,
{
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            record: T::from_row(row)?,
        })
    }
}

/// Root row plus every child collection, each in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBundle {
    pub execution: Execution,
    pub inputs: Vec<Stored<InputRecord>>,
    pub containers: Vec<Stored<ContainerRecord>>,
    pub agents: Vec<Stored<AgentRunRecord>>,
    pub acmg_evidence: Vec<Stored<EvidenceRow>>,
    pub artifacts: Vec<Stored<ArtifactRecord>>,
    pub audit_events: Vec<Stored<AuditNote>>,
}
