//! `arbiter` command line.
//!
//! Reads conversations as JSON lines, evaluates them, writes one JSON line
//! per evaluation. Logs go to stderr; filter with `RUST_LOG`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use arbiter_core::ConversationInput;
use arbiter_runtime::{EvaluatorConfig, Orchestrator, ProviderFactories};

#[derive(Parser)]
#[command(name = "arbiter", version, about = "Multi-judge evaluation of AI assistant answers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a JSON-lines file of conversations
    Evaluate {
        /// YAML configuration; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input file, one conversation per line ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Output file ("-" for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Write prefixed flat records instead of nested evaluations
        #[arg(long)]
        flat: bool,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Evaluate {
            config,
            input,
            output,
            flat,
        } => evaluate(config.as_deref(), &input, &output, flat).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig> {
    match path {
        Some(path) => EvaluatorConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EvaluatorConfig::default()),
    }
}

fn read_inputs(source: &str) -> Result<Vec<ConversationInput>> {
    let reader: Box<dyn BufRead> = if source == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(source).with_context(|| format!("opening {}", source))?;
        Box::new(BufReader::new(file))
    };

    let mut inputs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", source))?;
        if line.trim().is_empty() {
            continue;
        }
        let input: ConversationInput = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: not a conversation record", source, index + 1))?;
        inputs.push(input);
    }
    Ok(inputs)
}

async fn evaluate(config: Option<&Path>, input: &str, output: &str, flat: bool) -> Result<()> {
    let config = load_config(config)?;
    let orchestrator = Orchestrator::from_config(&config, &ProviderFactories::with_defaults())
        .context("building orchestrator")?;

    let inputs = read_inputs(input)?;
    tracing::info!(conversations = inputs.len(), source = %input, "Loaded conversations");

    let evaluations = orchestrator.evaluate_batch(inputs).await;

    let sink: Box<dyn Write> = if output == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(File::create(output).with_context(|| format!("creating {}", output))?)
    };
    let mut writer = BufWriter::new(sink);

    for evaluation in &evaluations {
        let line = if flat {
            serde_json::to_string(&evaluation.to_flat_record())?
        } else {
            serde_json::to_string(evaluation)?
        };
        writeln!(writer, "{}", line)?;
    }
    writer.flush().with_context(|| format!("writing {}", output))?;

    let usage = orchestrator.usage().total();
    let failed = evaluations.iter().filter(|e| !e.success).count();
    tracing::info!(
        evaluated = evaluations.len(),
        failed,
        llm_calls = usage.llm_calls,
        failed_calls = usage.failed_calls,
        total_tokens = usage.total_tokens,
        "Done"
    );
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let factories = ProviderFactories::with_defaults();
    factories
        .validate(&config.provider, &config.provider_config())
        .with_context(|| format!("provider '{}'", config.provider))?;

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
