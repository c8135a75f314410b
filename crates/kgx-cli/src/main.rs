//! KGX CLI - Command-line interface
//!
//! Usage:
//!   kgx extract "Alice founded Acme. She is the CEO."
//!   kgx extract --file article.txt --no-coref --stats
//!   kgx rewrite --file article.txt
//!   kgx split "Dr. Smith left. He returned."
//!   kgx tokens "It's here."
//!   kgx config

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kgx_core::config::AppConfig;
use kgx_core::{ExtractionRequest, SentenceSplitter};
use kgx_extractor::{tokenize, ExtractionPipeline, RuleBasedSplitter};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "kgx")]
#[command(about = "Knowledge graph extraction CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables take precedence)
    #[arg(long, global = true, env = "KGX_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Document text, given inline, from a file, or on stdin
#[derive(Args)]
struct Input {
    /// Text to process
    text: Option<String>,

    /// Read the text from a file
    #[arg(long, short, conflicts_with = "text")]
    file: Option<PathBuf>,
}

impl Input {
    fn read(self) -> anyhow::Result<String> {
        match (self.text, self.file) {
            (Some(text), _) => Ok(text),
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display())),
            (None, None) => std::io::read_to_string(std::io::stdin()).context("Failed to read stdin"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities and relations
    Extract {
        #[command(flatten)]
        input: Input,

        /// Minimum entity linking confidence
        #[arg(long)]
        entities_threshold: Option<f32>,

        /// Minimum relation score (exclusive)
        #[arg(long)]
        relation_threshold: Option<f32>,

        /// Skip coreference resolution
        #[arg(long)]
        no_coref: bool,

        /// Include request counters in the output
        #[arg(long)]
        stats: bool,
    },
    /// Print the text with coreferent mentions replaced
    Rewrite {
        #[command(flatten)]
        input: Input,
    },
    /// Print one sentence per line
    Split {
        #[command(flatten)]
        input: Input,
    },
    /// Print the tokens of a text as JSON
    Tokens {
        #[command(flatten)]
        input: Input,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("kgx={0},kgx_extractor={0}", config.logging.level).into());
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json || config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ExtractOutput {
    #[serde(flatten)]
    result: kgx_core::ExtractionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<kgx_extractor::ExtractionStats>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    init_tracing(&config, cli.json_logs);

    match cli.command {
        Commands::Extract {
            input,
            entities_threshold,
            relation_threshold,
            no_coref,
            stats,
        } => {
            let pipeline = ExtractionPipeline::from_config(&config)?;
            let mut request = ExtractionRequest::new(input.read()?, &config.pipeline);
            if let Some(threshold) = entities_threshold {
                request.entity_threshold = threshold;
            }
            if let Some(threshold) = relation_threshold {
                request.relation_threshold = threshold;
            }
            if no_coref {
                request.coref = false;
            }

            let (result, counters) = pipeline.extract_with_stats(&request).await?;
            print_json(&ExtractOutput {
                result,
                stats: stats.then_some(counters),
            })?;
        }
        Commands::Rewrite { input } => {
            let pipeline = ExtractionPipeline::from_config(&config)?;
            let (text, report) = pipeline.resolve_coreferences(&input.read()?).await?;
            tracing::info!(
                rewritten = report.rewritten.len(),
                skipped = report.skipped,
                conflicts = report.conflicts,
                "Coreferences resolved"
            );
            println!("{text}");
        }
        Commands::Split { input } => {
            for sentence in RuleBasedSplitter::new().split(&input.read()?) {
                println!("{sentence}");
            }
        }
        Commands::Tokens { input } => {
            print_json(&tokenize(&input.read()?))?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
