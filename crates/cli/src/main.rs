//! `stagehand` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`       — start the API server.
//! - `migrate`     — run pending database migrations.
//! - `validate`    — validate an application template JSON file.
//! - `test-action` — validate one `{ "type", "config" }` action definition.
//! - `render`      — run a text template against a JSON data file.
//! - `match`       — evaluate a criteria list against a JSON record.

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actions::transport::{LocalFileWriter, LogMailer, LogSmsGateway, ReqwestClient};
use actions::{ActionDefinition, ActionExecutor, Collaborators};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use db::{PgRoles, PgStore, PoolConfig};
use engine::{ApplicationTemplate, SettingsProvider, StageOrchestrator};
use serde_json::{Map, Value};
use templating::TemplateEngine;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "stagehand",
    about = "Application stage and action workflow engine",
    version
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "STAGEHAND_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        /// JSON object backing `$_NAME_$` setting tokens.
        #[arg(long, env = "STAGEHAND_SETTINGS")]
        settings: Option<PathBuf>,
        /// Where `file_generation` actions write.
        #[arg(long, env = "STAGEHAND_FILES_DIR", default_value = "generated")]
        files_dir: PathBuf,
        #[arg(long, default_value_t = 10)]
        max_connections: u32,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate an application template JSON file.
    Validate {
        /// Path to the template JSON file.
        path: PathBuf,
    },
    /// Validate one action definition and print its normalized form.
    TestAction {
        /// Path to a `{ "type": ..., "config": {...} }` JSON file.
        path: PathBuf,
    },
    /// Render a text template against a JSON object.
    Render {
        template: PathBuf,
        data: PathBuf,
        #[arg(long, env = "STAGEHAND_SETTINGS")]
        settings: Option<PathBuf>,
    },
    /// Check a JSON record against a criteria list.
    Match {
        record: PathBuf,
        criteria: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level)?;

    match cli.command {
        Command::Serve {
            bind,
            database_url,
            settings,
            files_dir,
            max_connections,
        } => {
            let config = PoolConfig {
                max_connections,
                ..PoolConfig::default()
            };
            let pool = db::create_pool(&database_url, &config)
                .await
                .context("failed to connect to database")?;

            let collaborators = Collaborators {
                mailer: Arc::new(LogMailer),
                http: Arc::new(ReqwestClient::new().context("failed to build HTTP client")?),
                files: Arc::new(LocalFileWriter::new(files_dir)),
                sms: Arc::new(LogSmsGateway),
            };
            let settings = load_settings(settings.as_deref())?;
            let executor = ActionExecutor::new(template_engine(settings.clone()), collaborators);
            let orchestrator = StageOrchestrator::new(
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgRoles::new(pool)),
                executor,
            );

            let mut state = api::AppState::new(orchestrator);
            if let Some(provider) = settings {
                state = state.with_settings(provider);
            }

            info!("Starting API server on {bind}");
            api::serve(&bind, state).await?;
        }
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let config = PoolConfig {
                max_connections: 2,
                acquire_timeout: Duration::from_secs(30),
            };
            let pool = db::create_pool(&database_url, &config)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let template = validate(&path)?;
            println!(
                "Template '{}' is valid: {}",
                template.form_name,
                template
                    .stages
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            );
        }
        Command::TestAction { path } => {
            let normalized = test_action(&path)?;
            println!("{}", serde_json::to_string_pretty(&normalized)?);
        }
        Command::Render {
            template,
            data,
            settings,
        } => {
            print!("{}", render(&template, &data, settings.as_deref())?);
        }
        Command::Match { record, criteria } => {
            let matched = evaluate(&record, &criteria)?;
            println!("{matched}");
            if !matched {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Option<Arc<SettingsProvider>>> {
    path.map(|p| SettingsProvider::load(p).map(Arc::new))
        .transpose()
        .context("failed to load settings")
}

fn template_engine(settings: Option<Arc<SettingsProvider>>) -> TemplateEngine {
    match settings {
        Some(provider) => TemplateEngine::new().with_shared_settings(provider),
        None => TemplateEngine::new(),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn read_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn validate(path: &Path) -> anyhow::Result<ApplicationTemplate> {
    let template: ApplicationTemplate = serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not an application template", path.display()))?;
    engine::validate_template(&template)?;
    Ok(template)
}

fn test_action(path: &Path) -> anyhow::Result<ActionDefinition> {
    let definition: ActionDefinition = serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not an action definition", path.display()))?;
    Ok(actions::test_action(&definition.action_type, &definition.config)?)
}

fn render(template: &Path, data: &Path, settings: Option<&Path>) -> anyhow::Result<String> {
    let text = std::fs::read_to_string(template)
        .with_context(|| format!("cannot read file {}", template.display()))?;
    Ok(template_engine(load_settings(settings)?).process(&text, &read_object(data)?))
}

fn evaluate(record: &Path, criteria: &Path) -> anyhow::Result<bool> {
    Ok(criteria::matches_value(&read_object(record)?, &read_json(criteria)?)?)
}
