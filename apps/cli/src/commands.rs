//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use servicecraft_core::{
    BlueprintPipeline, CatalogContext, DraftState, GenerationOutcome, GenerationRequest,
    ParseOutcome, ProgressReporter, parse_blueprint, prepare_draft,
};
use servicecraft_scoring::{AliasTable, RuleSet, ScoringEngine};
use servicecraft_shared::{
    AppConfig, AssessmentResponseSet, BlueprintId, BlueprintRecord, GenerationSettings,
    ScoreResult, init_config, load_config, resolve_api_key,
};
use servicecraft_generation::ChatClient;
use servicecraft_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ServiceCraft: explainable service recommendations and reviewed service-line blueprints.
#[derive(Parser)]
#[command(
    name = "servicecraft",
    version,
    about = "Score discovery assessments against service triggers and draft new service lines for review.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Blueprint database (defaults to `defaults.database_path`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Rule-set export format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum RulesFormat {
    Toml,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Score one assessment response set against the trigger rule set.
    Score {
        /// JSON file mapping question id to answer.
        #[arg(short, long)]
        responses: PathBuf,

        /// Rule set file (TOML or JSON). Overrides `scoring.rules_path`.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Alias table file (TOML). Overrides `scoring.aliases_path`.
        #[arg(long)]
        aliases: Option<PathBuf>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate, inspect and compile service-line blueprints.
    Blueprint {
        #[command(subcommand)]
        action: BlueprintAction,
    },

    /// Trigger rule set operations.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Blueprint subcommands.
#[derive(Subcommand)]
pub(crate) enum BlueprintAction {
    /// Ask the provider for a new blueprint and store it as a draft.
    Generate {
        /// Generation request (JSON).
        #[arg(short, long)]
        request: PathBuf,

        /// Catalog context (JSON: services, questions, skills).
        /// Defaults to the codes of the active rule set.
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Practice id, when the request file has none.
        #[arg(long)]
        practice: Option<String>,

        /// Model override.
        #[arg(long)]
        model: Option<String>,
    },

    /// Show a stored draft.
    Show {
        /// Blueprint id.
        #[arg(long)]
        id: String,

        /// Print only one compiled artifact (e.g. registry_entry, scorer_fragment).
        #[arg(long)]
        artifact: Option<String>,
    },

    /// List stored drafts, newest first.
    List {
        /// Only drafts for this practice.
        #[arg(long)]
        practice: Option<String>,
    },

    /// Parse and compile a saved model response without calling the provider.
    Compile {
        /// File holding the raw model output.
        #[arg(short, long)]
        file: PathBuf,

        /// Name used for identity defaults.
        #[arg(long, default_value = "New Service")]
        source_name: String,

        /// Catalog context (JSON) for collision and question-id checks.
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Directory to write the literal artifacts into.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Score this response set (JSON) with the compiled rules staged
        /// next to the active rule set.
        #[arg(long)]
        responses: Option<PathBuf>,
    },
}

/// Rule set subcommands.
#[derive(Subcommand)]
pub(crate) enum RulesAction {
    /// Print the active rule set.
    Export {
        #[arg(long, default_value = "toml")]
        format: RulesFormat,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "servicecraft=info",
        1 => "servicecraft=debug",
        _ => "servicecraft=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Score {
            responses,
            rules,
            aliases,
            json,
        } => cmd_score(&responses, rules.as_deref(), aliases.as_deref(), json),
        Command::Blueprint { action } => match action {
            BlueprintAction::Generate {
                request,
                context,
                practice,
                model,
            } => {
                cmd_generate(
                    &request,
                    context.as_deref(),
                    practice,
                    model,
                    db.as_deref(),
                )
                .await
            }
            BlueprintAction::Show { id, artifact } => {
                cmd_show(&id, artifact.as_deref(), db.as_deref()).await
            }
            BlueprintAction::List { practice } => cmd_list(practice.as_deref(), db.as_deref()).await,
            BlueprintAction::Compile {
                file,
                source_name,
                context,
                out,
                responses,
            } => cmd_compile(
                &file,
                &source_name,
                context.as_deref(),
                out.as_deref(),
                responses.as_deref(),
            ),
        },
        Command::Rules { action } => match action {
            RulesAction::Export { format } => cmd_rules_export(format),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn database_path(config: &AppConfig, flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.database_path))
}

fn load_rule_set(config: &AppConfig, flag: Option<&Path>) -> Result<RuleSet> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| config.scoring.rules_path.as_ref().map(PathBuf::from));
    Ok(match path {
        Some(path) => RuleSet::load_from(&path)?,
        None => RuleSet::discovery(),
    })
}

fn load_aliases(config: &AppConfig, flag: Option<&Path>) -> Result<AliasTable> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| config.scoring.aliases_path.as_ref().map(PathBuf::from));
    Ok(match path {
        Some(path) => AliasTable::load_from(&path)?,
        None => AliasTable::discovery(),
    })
}

fn load_responses(path: &Path) -> Result<AssessmentResponseSet> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read responses '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid responses file '{}': {e}", path.display()))
}

fn load_catalog(config: &AppConfig, path: Option<&Path>) -> Result<CatalogContext> {
    Ok(match path {
        Some(path) => CatalogContext::load_from(path)?,
        None => CatalogContext::from_rule_set(&load_rule_set(config, None)?),
    })
}

fn print_scores(results: &[ScoreResult]) {
    println!();
    println!(
        "  {:<3} {:<28} {:>5} {:>5} {:>4}  {}",
        "#", "Service", "Score", "Conf", "Pri", "Rec"
    );
    for (i, result) in results.iter().enumerate() {
        println!(
            "  {:<3} {:<28} {:>5} {:>5} {:>4}  {}",
            i + 1,
            result.name,
            result.score,
            result.confidence,
            result.priority,
            if result.recommended { "yes" } else { "" }
        );
        for hit in &result.triggers {
            println!("        {:+} {hit}", hit.points);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_score(
    responses: &Path,
    rules: Option<&Path>,
    aliases: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let engine = ScoringEngine::new(load_rule_set(&config, rules)?, load_aliases(&config, aliases)?);
    let answers = load_responses(responses)?;

    info!(
        rules = %engine.rules().version,
        answers = answers.len(),
        "scoring assessment"
    );
    let results = engine.score(&answers);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_scores(&results);
    }
    Ok(())
}

async fn cmd_generate(
    request_path: &Path,
    context: Option<&Path>,
    practice: Option<String>,
    model: Option<String>,
    db: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;

    let mut request = GenerationRequest::load_from(request_path)?;
    if request.practice_id.trim().is_empty() {
        request.practice_id = practice
            .or_else(|| config.defaults.practice_id.clone())
            .unwrap_or_default();
    }
    let catalog = load_catalog(&config, context)?;

    let mut settings = GenerationSettings::try_from(&config)?;
    if let Some(model) = model {
        settings.model = model;
    }
    let client = ChatClient::new(settings, api_key)?;
    let storage = Storage::open(&database_path(&config, db)).await?;

    info!(
        request = %request_path.display(),
        source = request.source.kind().as_str(),
        model = %client.settings().model,
        "generating blueprint"
    );

    let reporter = CliProgress::new();
    let outcome = BlueprintPipeline::new(&storage, &client, &catalog)
        .generate(&request, &reporter)
        .await?;

    println!();
    println!("  ID:     {}", outcome.blueprint_id);
    match &outcome.state {
        DraftState::Accepted {
            service_code,
            service_name,
            warnings,
        } => {
            println!("  Status: draft");
            println!("  Code:   {service_code}");
            println!("  Name:   {service_name}");
            for warning in warnings {
                println!("  Warn:   {warning}");
            }
        }
        DraftState::Failed { marker, message } => {
            println!("  Status: draft ({})", marker.as_str());
            println!("  Error:  {message}");
        }
    }
    println!("  Time:   {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn open_existing(config: &AppConfig, db: Option<&Path>) -> Result<Option<Storage>> {
    let path = database_path(config, db);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(Storage::open_readonly(&path).await?))
}

async fn cmd_show(id: &str, artifact: Option<&str>, db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let blueprint_id: BlueprintId = id
        .parse()
        .map_err(|e| eyre!("invalid blueprint id '{id}': {e}"))?;

    let storage = open_existing(&config, db)
        .await?
        .ok_or_else(|| eyre!("no blueprint database at '{}'", database_path(&config, db).display()))?;
    let record = storage
        .get_blueprint(&blueprint_id)
        .await?
        .ok_or_else(|| eyre!("blueprint '{id}' not found"))?;

    match artifact {
        Some(name) => print_artifact(&record, name),
        None => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}

fn print_artifact(record: &BlueprintRecord, name: &str) -> Result<()> {
    let key = camel_case(name);
    let text = record
        .blueprint
        .as_ref()
        .and_then(|doc| doc.get("implementation"))
        .and_then(|implementation| implementation.get(&key))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| eyre!("blueprint {} has no artifact '{name}'", record.id))?;
    println!("{text}");
    Ok(())
}

fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

async fn cmd_list(practice: Option<&str>, db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let Some(storage) = open_existing(&config, db).await? else {
        println!("No blueprints yet.");
        return Ok(());
    };
    let records = storage.list_blueprints(practice).await?;

    if records.is_empty() {
        println!("No blueprints yet.");
        return Ok(());
    }

    println!();
    for record in &records {
        let marker = record
            .error_marker
            .map(|m| format!(" ({})", m.as_str()))
            .unwrap_or_default();
        println!(
            "  {}  {:<10} {:<28} {}{}  {}",
            record.id,
            record.status.as_str(),
            record.service_code,
            record.service_name,
            marker,
            record.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    Ok(())
}

fn cmd_compile(
    file: &Path,
    source_name: &str,
    context: Option<&Path>,
    out: Option<&Path>,
    responses: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let raw = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let catalog = load_catalog(&config, context)?;

    let accepted = match parse_blueprint(&raw, source_name, &catalog) {
        ParseOutcome::Accepted(accepted) => accepted,
        ParseOutcome::NeedsRepair { error, excerpt } => {
            let preview: String = excerpt.chars().take(200).collect();
            return Err(eyre!("model output needs manual repair: {error}\n{preview}"));
        }
    };

    let draft = prepare_draft(accepted, source_name, "offline");
    for warning in &draft.warnings {
        println!("warning: {warning}");
    }
    let artifacts = draft
        .artifacts
        .ok_or_else(|| eyre!("blueprint '{}' did not compile", draft.identity.code))?;

    match out {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| eyre!("cannot create '{}': {e}", dir.display()))?;
            for (name, text) in artifacts.named() {
                let path = dir.join(format!("{name}.{}", artifact_extension(name)));
                std::fs::write(&path, text)
                    .map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
                println!("wrote {}", path.display());
            }
        }
        None => {
            for (name, text) in artifacts.named() {
                println!("==> {name}\n{text}\n");
            }
        }
    }
    println!("fingerprint: {}", artifacts.fingerprint);

    if let Some(responses) = responses {
        let staged = load_rule_set(&config, None)?.with_candidate(artifacts.rules.clone());
        let engine = ScoringEngine::new(staged, load_aliases(&config, None)?);
        let results = engine.score(&load_responses(responses)?);
        info!(candidate = %artifacts.rules.code, rules = %engine.rules().version, "scored with staged candidate");
        print_scores(&results);
    }

    Ok(())
}

fn artifact_extension(name: &str) -> &'static str {
    match name {
        "scorer_fragment" => "rs",
        "skills_mapping" => "md",
        n if n.ends_with("_migration") => "sql",
        _ => "toml",
    }
}

fn cmd_rules_export(format: RulesFormat) -> Result<()> {
    let config = load_config()?;
    let rules = load_rule_set(&config, None)?;
    match format {
        RulesFormat::Toml => println!("{}", rules.to_toml()?),
        RulesFormat::Json => println!("{}", serde_json::to_string_pretty(&rules)?),
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &GenerationOutcome) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_score_command() {
        let cli = Cli::try_parse_from([
            "servicecraft",
            "-vv",
            "score",
            "--responses",
            "answers.json",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Score { json: true, .. }));
    }

    #[test]
    fn cli_parses_blueprint_compile() {
        let cli = Cli::try_parse_from([
            "servicecraft",
            "blueprint",
            "compile",
            "--file",
            "raw.txt",
            "--source-name",
            "Cash Flow Clinic",
            "--db",
            "x.db",
        ])
        .unwrap();
        assert_eq!(cli.db.as_deref(), Some(Path::new("x.db")));
        let Command::Blueprint {
            action: BlueprintAction::Compile { source_name, .. },
        } = cli.command
        else {
            panic!("expected blueprint compile");
        };
        assert_eq!(source_name, "Cash Flow Clinic");
    }

    #[test]
    fn artifact_names_map_to_document_keys() {
        assert_eq!(camel_case("registry_entry"), "registryEntry");
        assert_eq!(camel_case("services_migration"), "servicesMigration");
        assert_eq!(artifact_extension("pricing_migration"), "sql");
        assert_eq!(artifact_extension("scorer_fragment"), "rs");
        assert_eq!(artifact_extension("registry_entry"), "toml");
    }
}
