//! CLI command definitions for synth-forge.
//!
//! Commands map one-to-one onto the pipeline entry points, plus `init-db`
//! for preparing the SQLite schema.

use crate::agents::{Agents, LlmAgentConfig};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::pipeline::{
    pipeline_status, PendingRequest, PipelineConfig, PipelineOrchestrator, PipelineRequest,
    PipelineRunResult, PipelineStatus, RunStatus,
};
use crate::storage::{Classification, MemoryStore, QuestionStore, SqliteStore, TrainingType};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Synthetic post-training data pipeline.
#[derive(Parser)]
#[command(name = "synth-forge")]
#[command(about = "Generate reviewed synthetic LLM post-training data")]
#[command(version)]
#[command(
    long_about = "synth-forge pushes questions through research, generation, review and storage.\n\nExample usage:\n  synth-forge run --questions questions.yaml --topic chemistry --sub-topic organic --training-type sft"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Store new questions and run them through every stage.
    Run(RunArgs),

    /// Run questions already stored in the `pending` stage.
    ProcessPending(PendingArgs),

    /// Retry questions left in the `pending` stage.
    ResumeFailed(PendingArgs),

    /// Show question counts per pipeline stage.
    Status(StatusArgs),

    /// Create or reset the database schema.
    InitDb(InitDbArgs),
}

/// Database and LLM connection options shared by the commands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// SQLite path or URL (overrides DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,

    /// Model used by the agents.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// LiteLLM-compatible API base URL.
    #[arg(long, env = "LITELLM_API_BASE")]
    pub api_base: Option<String>,

    /// API key for the LLM endpoint.
    #[arg(long, env = "LITELLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Questions processed concurrently per group.
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,
}

/// Arguments for `synth-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Question file: YAML, JSON, or plain text with one question per line.
    #[arg(short = 'q', long)]
    pub questions: String,

    /// Topic of the questions (overrides the file).
    #[arg(long)]
    pub topic: Option<String>,

    /// Sub-topic of the questions (overrides the file).
    #[arg(long)]
    pub sub_topic: Option<String>,

    /// Training type to generate (sft, dpo, ppo, grpo, rlhf, kto, orpo, chat, qa).
    #[arg(short = 't', long)]
    pub training_type: Option<TrainingType>,

    /// Process at most this many questions.
    #[arg(short = 'n', long)]
    pub max_questions: Option<usize>,

    /// Also store records the reviewer marked `needs_revision`.
    #[arg(long)]
    pub auto_approve: bool,

    /// Keep everything in memory instead of writing to the database.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Output JSON result.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `synth-forge process-pending` and `resume-failed`.
#[derive(Parser, Debug)]
pub struct PendingArgs {
    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub sub_topic: Option<String>,

    /// Training type to generate (defaults to the stored questions').
    #[arg(short = 't', long)]
    pub training_type: Option<TrainingType>,

    /// Maximum number of pending questions to pull.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Also store records the reviewer marked `needs_revision`.
    #[arg(long)]
    pub auto_approve: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Output JSON result.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `synth-forge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub sub_topic: Option<String>,

    /// SQLite path or URL (overrides DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,

    /// Output JSON result.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `synth-forge init-db`.
#[derive(Parser, Debug)]
pub struct InitDbArgs {
    /// SQLite path or URL (overrides DATABASE_URL).
    #[arg(long)]
    pub database: Option<String>,

    /// Drop all tables before re-applying the schema.
    #[arg(long)]
    pub reset: bool,
}

/// Contents of a question file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QuestionFile {
    /// A bare list of questions.
    List(Vec<String>),
    /// Questions with their classification.
    Document {
        questions: Vec<String>,
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        sub_topic: Option<String>,
        #[serde(default)]
        training_type: Option<TrainingType>,
    },
}

impl QuestionFile {
    /// Parses `content`, choosing the format from `path`'s extension.
    pub fn parse(path: &Path, content: &str) -> anyhow::Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let file = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
            Some("json") => serde_json::from_str(content)?,
            _ => QuestionFile::List(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string)
                    .collect(),
            ),
        };
        Ok(file)
    }

    /// Splits into questions and classification, `args` taking precedence.
    fn into_request(
        self,
        topic: Option<String>,
        sub_topic: Option<String>,
        training_type: Option<TrainingType>,
    ) -> anyhow::Result<(Vec<String>, Classification)> {
        let (questions, file_topic, file_sub_topic, file_type) = match self {
            QuestionFile::List(questions) => (questions, None, None, None),
            QuestionFile::Document {
                questions,
                topic,
                sub_topic,
                training_type,
            } => (questions, topic, sub_topic, training_type),
        };

        let topic = topic
            .or(file_topic)
            .ok_or_else(|| anyhow::anyhow!("--topic is required when the file does not set one"))?;
        let sub_topic = sub_topic.or(file_sub_topic).ok_or_else(|| {
            anyhow::anyhow!("--sub-topic is required when the file does not set one")
        })?;
        let training_type = training_type.or(file_type).unwrap_or_default();

        let questions = questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        Ok((
            questions,
            Classification::new(topic, sub_topic, training_type),
        ))
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::ProcessPending(args) => run_pending_command(args, false).await,
        Commands::ResumeFailed(args) => run_pending_command(args, true).await,
        Commands::Status(args) => run_status_command(args).await,
        Commands::InitDb(args) => run_init_db_command(args).await,
    }
}

// ============================================================================
// Command Implementation
// ============================================================================

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let path = Path::new(&args.questions);
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.questions, e))?;
    let (questions, classification) = QuestionFile::parse(path, &content)?.into_request(
        args.topic,
        args.sub_topic,
        args.training_type,
    )?;

    if questions.is_empty() {
        anyhow::bail!("No questions found in {}", args.questions);
    }

    let config = load_config(&args.connection, args.auto_approve)?;
    let store: Arc<dyn QuestionStore> = if args.dry_run {
        info!("Dry run: results are kept in memory");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(open_store(&config.database_url).await?)
    };
    let agents = build_agents(&args.connection, &config)?;
    let orchestrator = PipelineOrchestrator::new(config, store, agents)?;

    let mut request = PipelineRequest::new(questions, classification);
    if let Some(max) = args.max_questions {
        request = request.with_max_questions(max);
    }

    let result = orchestrator.run_pipeline(request).await;
    report_run(&result, args.json)
}

async fn run_pending_command(args: PendingArgs, resume: bool) -> anyhow::Result<()> {
    let config = load_config(&args.connection, args.auto_approve)?;
    let store = Arc::new(open_store(&config.database_url).await?);
    let agents = build_agents(&args.connection, &config)?;
    let orchestrator = PipelineOrchestrator::new(config, store, agents)?;

    let mut request = PendingRequest::new();
    request.topic = args.topic;
    request.sub_topic = args.sub_topic;
    request.training_type = args.training_type;
    request.limit = args.limit;

    let result = if resume {
        orchestrator.resume_failed(request).await
    } else {
        orchestrator.process_pending(request).await
    };
    report_run(&result, args.json)
}

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let connection = ConnectionArgs {
        database: args.database,
        ..ConnectionArgs::default()
    };
    let config = load_config(&connection, false)?;
    let store = open_store(&config.database_url).await?;
    let status =
        pipeline_status(&store, args.topic.as_deref(), args.sub_topic.as_deref()).await?;
    store.close().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

async fn run_init_db_command(args: InitDbArgs) -> anyhow::Result<()> {
    let connection = ConnectionArgs {
        database: args.database,
        ..ConnectionArgs::default()
    };
    let config = load_config(&connection, false)?;
    let store = SqliteStore::open(&config.database_url).await?;
    let migrations = store.migrations();

    if args.reset {
        info!(database = %config.database_url, "Resetting database");
        migrations.reset_database().await?;
    }

    let applied = migrations.run_migrations().await?;
    let all = migrations.list_applied_migrations().await?;
    println!("✓ Database ready: {}", config.database_url);
    println!("  Newly applied: {}", applied);
    println!("  Total migrations: {}", all.len());

    store.close().await;
    Ok(())
}

fn load_config(connection: &ConnectionArgs, auto_approve: bool) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(database) = &connection.database {
        config = config.with_database_url(database.clone());
    }
    if let Some(model) = &connection.model {
        config = config.with_model(model.clone());
    }
    if let Some(batch_size) = connection.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if auto_approve {
        config = config.with_auto_approve(true);
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(database_url: &str) -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::open(database_url).await?;
    let applied = store.run_migrations().await?;
    if applied > 0 {
        info!(applied, "Applied database migrations");
    }
    Ok(store)
}

fn build_agents(connection: &ConnectionArgs, config: &PipelineConfig) -> anyhow::Result<Agents> {
    let Some(api_base) = connection.api_base.clone() else {
        anyhow::bail!(
            "LITELLM_API_BASE is required but not set.\n\
             Provide it via --api-base <URL> or set the LITELLM_API_BASE environment variable."
        );
    };

    let llm: Arc<dyn LlmProvider> = Arc::new(LiteLlmClient::new(
        api_base,
        connection.api_key.clone(),
        config.model.clone(),
    )?);
    info!(model = %config.model, "Using LiteLLM endpoint for agents");

    let agent_config = LlmAgentConfig::default()
        .with_model(config.model.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
    Ok(Agents::from_llm(llm, agent_config))
}

fn report_run(result: &PipelineRunResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print_run(result);
    }

    if result.status == RunStatus::Error {
        let reason = result
            .error
            .clone()
            .unwrap_or_else(|| "no records were approved".to_string());
        anyhow::bail!("Pipeline failed: {}", reason);
    }
    Ok(())
}

fn print_run(result: &PipelineRunResult) {
    if let Some(message) = &result.message {
        println!("{}", message);
        return;
    }

    let mark = match result.status {
        RunStatus::Success => "✓",
        RunStatus::Partial => "~",
        RunStatus::Error => "✗",
    };
    println!("{} Pipeline finished: {}", mark, result.status);

    if let Some(summary) = &result.summary {
        println!("  Questions:    {}", summary.total_questions);
        println!("  Researched:   {}", summary.researched);
        println!("  Generated:    {}", summary.generated);
        println!("  Reviewed:     {}", summary.reviewed);
        println!("  Approved:     {}", summary.approved);
        println!("  Rejected:     {}", summary.rejected);
        println!("  Failed:       {}", summary.failed);
        println!("  Success rate: {:.1}%", summary.success_rate);
    }

    if let Some(error) = &result.error {
        println!("  Error: {}", error);
    }

    if !result.errors.is_empty() {
        println!("  Item errors:");
        for entry in &result.errors {
            println!("    #{} [{}] {}", entry.question_id, entry.stage, entry.error);
        }
    }
}

fn print_status(status: &PipelineStatus) {
    let scope = match (&status.topic, &status.sub_topic) {
        (Some(topic), Some(sub_topic)) => format!("{}/{}", topic, sub_topic),
        (Some(topic), None) => topic.clone(),
        (None, Some(sub_topic)) => format!("*/{}", sub_topic),
        (None, None) => "all topics".to_string(),
    };
    println!("Pipeline status ({})", scope);
    println!("  pending:              {}", status.stages.pending);
    println!("  ready_for_generation: {}", status.stages.ready_for_generation);
    println!("  generated:            {}", status.stages.generated);
    println!("  reviewed:             {}", status.stages.reviewed);
    println!("  approved:             {}", status.stages.approved);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_args() {
        let args = vec![
            "synth-forge",
            "run",
            "--questions",
            "q.yaml",
            "--topic",
            "chemistry",
            "--training-type",
            "dpo",
            "-n",
            "5",
            "--dry-run",
            "--batch-size",
            "3",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.questions, "q.yaml");
                assert_eq!(args.topic.as_deref(), Some("chemistry"));
                assert_eq!(args.training_type, Some(TrainingType::Dpo));
                assert_eq!(args.max_questions, Some(5));
                assert!(args.dry_run);
                assert!(!args.auto_approve);
                assert_eq!(args.connection.batch_size, Some(3));
                assert!(!args.json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_invalid_training_type_is_rejected() {
        let args = vec!["synth-forge", "process-pending", "--training-type", "lora"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_status_command_defaults() {
        let cli = Cli::try_parse_from(vec!["synth-forge", "status", "--json"]).expect("should parse");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Status(args) => {
                assert!(args.json);
                assert!(args.topic.is_none());
                assert!(args.database.is_none());
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_question_file_yaml_document() {
        let content = "topic: biology\nsub_topic: genetics\ntraining_type: qa\nquestions:\n  - What is a gene?\n  - What is DNA?\n";
        let file = QuestionFile::parse(Path::new("q.yaml"), content).unwrap();
        let (questions, classification) = file.into_request(None, None, None).unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(classification.topic, "biology");
        assert_eq!(classification.sub_topic, "genetics");
        assert_eq!(classification.training_type, TrainingType::Qa);
    }

    #[test]
    fn test_question_file_json_list_with_overrides() {
        let content = r#"["What is entropy?", "  ", "Define enthalpy."]"#;
        let file = QuestionFile::parse(Path::new("Q.JSON"), content).unwrap();
        let (questions, classification) = file
            .into_request(Some("physics".into()), Some("thermo".into()), None)
            .unwrap();

        assert_eq!(questions, vec!["What is entropy?", "Define enthalpy."]);
        assert_eq!(classification.training_type, TrainingType::Sft);
    }

    #[test]
    fn test_question_file_text_skips_comments() {
        let content = "# chemistry\nWhat is a mole?\n\nWhat is pH?\n";
        let file = QuestionFile::parse(Path::new("questions.txt"), content).unwrap();
        assert_eq!(
            file,
            QuestionFile::List(vec!["What is a mole?".into(), "What is pH?".into()])
        );
    }

    #[test]
    fn test_missing_topic_is_an_error() {
        let file = QuestionFile::List(vec!["What is a mole?".into()]);
        let err = file.into_request(None, Some("stoich".into()), None).unwrap_err();
        assert!(err.to_string().contains("--topic"));
    }
}
