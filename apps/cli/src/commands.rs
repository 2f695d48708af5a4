//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use promptforge_analysis::detect_localized;
use promptforge_core::{Collaborators, HttpJudge, enrich_master_prompt};
use promptforge_retrieval::{
    Corpus, EmbeddingCache, EmbeddingProvider, HttpEmbeddingProvider, InMemoryIndex, Retriever,
};
use promptforge_shared::{
    AppConfig, EnrichmentOptions, EnrichmentResult, config_file_path, expand_home, init_config,
    load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// PromptForge — find and fill the gaps in your master prompts.
#[derive(Parser)]
#[command(
    name = "promptforge",
    version,
    about = "Analyze master prompts for ambiguity and enrich them from a prompt library.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Analyze a prompt and report its gaps.
    Detect {
        /// Prompt file to analyze, or `-` for stdin.
        file: String,

        /// Domain tag (backend, frontend, testing, ...).
        #[arg(short, long)]
        domain: Option<String>,

        /// Emit the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show ranked library candidates for a prompt's gaps.
    Search {
        /// Prompt file to analyze, or `-` for stdin.
        file: String,

        /// Domain tag used for boosting.
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Enrich a prompt and print the result.
    Enrich {
        /// Prompt file to enrich, or `-` for stdin.
        file: String,

        /// Enrichment mode: off, fast, deep, or agent.
        #[arg(short, long)]
        mode: Option<String>,

        /// Token budget for merged library content.
        #[arg(short, long)]
        budget: Option<usize>,

        /// Domain tag.
        #[arg(short, long)]
        domain: Option<String>,

        /// Output language for scaffolds: en or tr.
        #[arg(short, long)]
        language: Option<String>,

        /// Emit the full result as JSON instead of text plus summary.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "promptforge=info",
        1 => "promptforge=debug",
        _ => "promptforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Detect { file, domain, json } => cmd_detect(&file, domain.as_deref(), json).await,
        Command::Search { file, domain } => cmd_search(&file, domain.as_deref()).await,
        Command::Enrich {
            file,
            mode,
            budget,
            domain,
            language,
            json,
        } => {
            cmd_enrich(
                &file,
                mode.as_deref(),
                budget,
                domain.as_deref(),
                language.as_deref(),
                json,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Input and collaborator plumbing
// ---------------------------------------------------------------------------

/// Read the prompt from a file, or stdin when the argument is `-`.
fn read_prompt(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| eyre!("failed to read stdin: {e}"))?;
        Ok(text)
    } else {
        std::fs::read_to_string(file).map_err(|e| eyre!("failed to read '{file}': {e}"))
    }
}

/// Assemble the retriever from config: library, embedding provider, and
/// vector index. Every missing piece degrades toward lexical-only search.
async fn build_retriever(config: &AppConfig) -> Retriever {
    let corpus = Arc::new(Corpus::load(&expand_home(&config.corpus.path)));
    let cache = Arc::new(EmbeddingCache::new());

    let provider = match HttpEmbeddingProvider::from_config(&config.provider) {
        Ok(Some(provider)) => Some(Arc::new(provider) as Arc<dyn EmbeddingProvider>),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "embedding provider unavailable, using lexical search");
            None
        }
    };

    if let Some(provider) = provider {
        if !corpus.is_empty() {
            match InMemoryIndex::build(&corpus, provider.as_ref(), &cache).await {
                Ok(index) => {
                    return Retriever::new(corpus, Some(provider), Some(Arc::new(index)), cache);
                }
                Err(e) => {
                    warn!(error = %e, "index build failed, using lexical search");
                }
            }
        }
    }
    Retriever::new(corpus, None, None, cache)
}

/// Assemble the full collaborator set for the pipeline.
async fn build_collaborators(config: &AppConfig) -> Collaborators {
    let retriever = Arc::new(build_retriever(config).await);
    let mut collab = Collaborators::new(retriever);
    match HttpJudge::from_config(&config.judge) {
        Ok(Some(judge)) => {
            collab = collab.with_judge(
                Arc::new(judge),
                config.judge.target_score,
                config.judge.max_iterations,
            );
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "judge unavailable, refinement runs unjudged"),
    }
    collab
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar.set_message(message.to_string());
    bar
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_detect(file: &str, domain: Option<&str>, json: bool) -> Result<()> {
    let config = load_config()?;
    let text = read_prompt(file)?;
    let language = config.defaults.language.parse().unwrap_or_default();

    let report = detect_localized(&text, domain, language)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  Ambiguity score: {}/100", report.ambiguity_score);
    println!("  Gaps found:      {}", report.total_gaps);
    println!();
    for score in &report.section_scores {
        println!(
            "  [{}] score {} ({} words, {} gaps)",
            score.section, score.score, score.word_count, score.gap_count
        );
    }
    if !report.gaps.is_empty() {
        println!();
        for gap in &report.gaps {
            println!(
                "  {:<8} {:<9} [{}] {}",
                gap.id,
                format!("{:?}", gap.severity).to_lowercase(),
                gap.section,
                gap.description
            );
            if let Some(excerpt) = &gap.excerpt {
                println!("           \"{excerpt}\"");
            }
        }
    }
    println!();
    Ok(())
}

async fn cmd_search(file: &str, domain: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let text = read_prompt(file)?;
    let language = config.defaults.language.parse().unwrap_or_default();

    let mut options = EnrichmentOptions::from(&config);
    options.domain = domain.map(String::from);

    let report = detect_localized(&text, domain, language)?;
    if !report.has_gaps() {
        println!("No gaps detected; nothing to search for.");
        return Ok(());
    }

    let bar = spinner("Searching prompt library...");
    let retriever = build_retriever(&config).await;
    let candidates = retriever.search(&text, &report.gaps, &options).await;
    bar.finish_and_clear();

    if candidates.is_empty() {
        println!("No candidates matched.");
        return Ok(());
    }

    println!();
    for cand in &candidates {
        println!(
            "  {:.2}  {:<12} [{}] {}",
            cand.relevance_score,
            cand.prompt_id,
            cand.target_section,
            cand.name
        );
        if let Some(gap_id) = &cand.target_gap_id {
            println!("        fills {gap_id}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_enrich(
    file: &str,
    mode: Option<&str>,
    budget: Option<usize>,
    domain: Option<&str>,
    language: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let text = read_prompt(file)?;

    let mut options = EnrichmentOptions::from(&config);
    if let Some(mode) = mode {
        options.mode = mode.parse().map_err(|e: String| eyre!(e))?;
    }
    if let Some(budget) = budget {
        options.max_token_budget = budget;
    }
    if let Some(domain) = domain {
        options.domain = Some(domain.to_string());
    }
    if let Some(language) = language {
        options.language = language.parse().map_err(|e: String| eyre!(e))?;
    }

    info!(mode = %options.mode, budget = options.max_token_budget, "enriching prompt");

    let bar = spinner("Enriching...");
    let collab = build_collaborators(&config).await;
    let result = enrich_master_prompt(&text, &options, &collab).await?;
    bar.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.enriched_text);
    print_summary(&result);
    Ok(())
}

fn print_summary(result: &EnrichmentResult) {
    eprintln!();
    eprintln!("  Run:         {}", result.run_id);
    eprintln!("  Mode:        {}", result.mode);
    eprintln!(
        "  Ambiguity:   {}/100 ({} gaps)",
        result.ambiguity_report.ambiguity_score, result.ambiguity_report.total_gaps
    );
    eprintln!(
        "  Candidates:  {} found, {} merged",
        result.candidates_found, result.integrated_candidates
    );
    eprintln!("  Token delta: {:+}", result.metrics.token_delta);
    if let Some(agent) = &result.agent_metrics {
        eprintln!(
            "  Agent:       {} fixes, {} iterations, judge {:?} -> {:?}{}",
            agent.auto_fixes_applied,
            agent.iterations,
            agent.judge_score_before,
            agent.judge_score_after,
            if agent.target_reached { " (target reached)" } else { "" }
        );
        eprintln!(
            "  Ambiguity:   {} -> {}",
            agent.ambiguity_before, agent.ambiguity_after
        );
    }
    eprintln!("  Time:        {}ms", result.metrics.elapsed_ms);
    eprintln!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    println!("# {}", config_file_path()?.display());
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
