use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helixsh_audit::audit::AuditLedger;
use helixsh_audit::config::AppConfig;
use helixsh_audit::crypto::signing;
use helixsh_audit::database::models::{
    ContainerRecord, ExecutionFinish, InputRecord, NewExecution, STATUS_COMPLETED,
};
use helixsh_audit::database::ProvenanceStore;
use helixsh_audit::error::ProvenanceError;
use helixsh_audit::provenance::lifecycle::{file_size_bytes, sha256_file, ExecutionContext};
use helixsh_audit::provenance::{make_provenance_record, parse_params};

/// Exit status for a check that ran but did not pass.
const EXIT_CHECK_FAILED: u8 = 2;
const EXIT_SUCCESS: u8 = 0;

#[derive(Parser)]
#[command(
    name = "helixsh-audit",
    version,
    about = "Execution provenance, audit ledger and signing for helixsh"
)]
struct Cli {
    /// Audit ledger path (overrides HELIXSH_AUDIT_FILE)
    #[arg(long, global = true, value_name = "PATH")]
    audit_file: Option<PathBuf>,

    /// Provenance database path (overrides HELIXSH_DB)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the execution hash of a command and its parameters
    Provenance {
        #[arg(long)]
        command: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Append an audit event for a planned or executed command
    Record {
        #[arg(long)]
        command: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long)]
        strict: bool,
        #[arg(long, default_value = "plan")]
        mode: String,
        #[arg(long, default_value = "analyst")]
        role: String,
    },
    /// Show the most recent audit event
    Explain {
        #[arg(default_value = "last")]
        scope: String,
    },
    /// Verify every ledger line against its execution hash
    AuditVerify,
    /// Write a reproducibility record of the ledger
    AuditExport {
        #[arg(long)]
        out: PathBuf,
    },
    /// Sign the ledger with an HMAC key
    AuditSign {
        #[arg(long)]
        key_file: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Check a ledger signature
    AuditVerifySignature {
        #[arg(long)]
        key_file: Option<PathBuf>,
        #[arg(long)]
        signature_file: PathBuf,
    },
    /// Open an execution record with its inputs and container images
    ExecutionStart(StartArgs),
    /// Close an execution record with its terminal status
    ExecutionFinish {
        #[arg(long)]
        execution_id: String,
        #[arg(long, default_value = STATUS_COMPLETED)]
        status: String,
        #[arg(long)]
        exit_code: Option<i64>,
        #[arg(long)]
        output_hash: Option<String>,
    },
    /// Attach a free-form audit note to an execution
    ExecutionNote {
        #[arg(long)]
        execution_id: String,
        #[arg(long)]
        event_type: String,
        #[arg(long)]
        message: String,
    },
    /// Print the full provenance bundle of an execution
    AuditShow {
        #[arg(long)]
        execution_id: String,
    },
}

#[derive(Args)]
struct StartArgs {
    #[arg(long)]
    command: String,
    #[arg(long)]
    workflow: Option<String>,
    #[arg(long)]
    agent: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long = "input", value_name = "PATH")]
    inputs: Vec<PathBuf>,
    #[arg(long = "image", value_name = "IMAGE")]
    images: Vec<String>,
    #[arg(long, default_value = "docker")]
    runtime: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(path) = cli.audit_file {
        config.audit_file = path;
    }
    if let Some(path) = cli.db {
        config.database_path = path;
    }

    // Logs go to stderr so stdout stays machine-parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(ExitCode::from(run(cli.command, &config).await?))
}

/// Execute one command, printing its JSON result. Returns the process exit status.
async fn run(command: Commands, config: &AppConfig) -> Result<u8> {
    let ledger = AuditLedger::open(&config.audit_file);

    match command {
        Commands::Provenance { command, params } => {
            let record = make_provenance_record(&command, parse_params(&params)?);
            print_json(&record)?;
        }

        Commands::Record {
            command,
            params,
            strict,
            mode,
            role,
        } => {
            let event = ledger.record(&command, parse_params(&params)?, strict, &mode, &role)?;
            print_json(&event)?;
        }

        Commands::Explain { scope } => {
            if scope != "last" {
                return Err(anyhow!("Only 'last' explanation scope is currently supported."));
            }
            match ledger.read_last() {
                Ok(event) => {
                    let hash_valid = event.verify_hash();
                    print_json(&json!({ "last": event, "hash_valid": hash_valid }))?;
                }
                Err(ProvenanceError::LedgerEmpty(_)) => {
                    print_json(&json!({
                        "last": null,
                        "message": "No previous audit events found."
                    }))?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::AuditVerify => {
            let report = ledger.verify()?;
            print_json(&report)?;
            if !report.ok {
                return Ok(EXIT_CHECK_FAILED);
            }
        }

        Commands::AuditExport { out } => {
            let report = ledger.export(&out)?;
            print_json(&json!({ "export_file": out, "export": report }))?;
        }

        Commands::AuditSign { key_file, out } => {
            let key = signing::read_key(key_path(key_file, config)?)?;
            let signature = signing::sign_bytes(&ledger.raw_content()?, &key)?;
            signing::write_signature(&out, &signature)?;
            info!("Signed audit ledger {}", ledger.location());
            print_json(&json!({
                "audit_file": ledger.location(),
                "signature_file": out,
                "signature": signature,
            }))?;
        }

        Commands::AuditVerifySignature {
            key_file,
            signature_file,
        } => {
            let key = signing::read_key(key_path(key_file, config)?)?;
            let expected = signing::read_signature(&signature_file)?;
            let ok = signing::verify_bytes(&ledger.raw_content()?, &key, &expected)?;
            print_json(&json!({
                "ok": ok,
                "audit_file": ledger.location(),
                "signature_file": signature_file,
            }))?;
            if !ok {
                return Ok(EXIT_CHECK_FAILED);
            }
        }

        Commands::ExecutionStart(args) => {
            let context = start_execution(&args, config).await?;
            print_json(&json!({
                "execution_context": context,
                "db": config.database_path,
            }))?;
        }

        Commands::ExecutionFinish {
            execution_id,
            status,
            exit_code,
            output_hash,
        } => {
            let store = ProvenanceStore::open(&config.database_path).await?;
            store
                .finish_execution(&execution_id, &ExecutionFinish::now(&status, output_hash, exit_code))
                .await?;
            store
                .insert_audit_note(&execution_id, "execution_finished", &status)
                .await?;
            print_json(&store.get_execution(&execution_id).await?)?;
        }

        Commands::ExecutionNote {
            execution_id,
            event_type,
            message,
        } => {
            let store = ProvenanceStore::open(&config.database_path).await?;
            let row_id = store
                .insert_audit_note(&execution_id, &event_type, &message)
                .await?;
            print_json(&json!({ "execution_id": execution_id, "id": row_id }))?;
        }

        Commands::AuditShow { execution_id } => {
            let store = ProvenanceStore::open(&config.database_path).await?;
            print_json(&store.get_execution_bundle(&execution_id).await?)?;
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Open the execution row and record its inputs, images and start note.
async fn start_execution(args: &StartArgs, config: &AppConfig) -> Result<ExecutionContext> {
    let store = ProvenanceStore::open(&config.database_path).await?;
    let working_dir = std::env::current_dir()
        .context("Failed to resolve working directory")?
        .display()
        .to_string();
    let container_digest = args.images.iter().find_map(|image| image_digest(image));

    let context =
        ExecutionContext::create(&working_dir, &args.inputs, args.agent.clone(), container_digest)?;

    let execution = NewExecution::running(&context.execution_id, &args.command, &context.input_hash)
        .with_workflow(args.workflow.clone())
        .with_agent(args.agent.clone(), args.model.clone())
        .with_container_digest(context.container_digest.clone());
    store.create_execution(&execution).await?;

    for path in &args.inputs {
        store
            .insert_input(
                &context.execution_id,
                InputRecord {
                    file_path: path.display().to_string(),
                    sha256: sha256_file(path)?,
                    size_bytes: input_size(path)?,
                },
            )
            .await?;
    }

    for image in &args.images {
        store
            .insert_container(
                &context.execution_id,
                ContainerRecord {
                    image_name: image_name(image).to_string(),
                    image_digest: image_digest(image),
                    runtime: args.runtime.clone(),
                    version: None,
                },
            )
            .await?;
    }

    store
        .insert_audit_note(&context.execution_id, "execution_started", &args.command)
        .await?;
    store.close().await;

    Ok(context)
}

fn key_path(explicit: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    explicit
        .or_else(|| config.signing_key_path.clone())
        .ok_or_else(|| anyhow!("No signing key given (use --key-file or HELIXSH_SIGNING_KEY)"))
}

fn input_size(path: &Path) -> Result<i64> {
    let size = file_size_bytes(path)?;
    i64::try_from(size).with_context(|| format!("Input too large to record: {}", path.display()))
}

/// `repo/image:tag@sha256:...` -> `repo/image:tag`
fn image_name(image: &str) -> &str {
    image.split_once('@').map_or(image, |(name, _)| name)
}

/// `repo/image@sha256:abc` -> `sha256:abc`
fn image_digest(image: &str) -> Option<String> {
    image
        .split_once('@')
        .map(|(_, digest)| digest.trim())
        .filter(|digest| digest.starts_with("sha256:") && digest.len() > "sha256:".len())
        .map(str::to_string)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
