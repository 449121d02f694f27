//! `research-cli`: submit research jobs and inspect their state.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use research_logging::{LevelFilter, LogDestination};

mod commands;
mod config;

use config::{load_config, ConfigOverrides, DEFAULT_CONFIG_FILENAME};

#[derive(Parser, Debug)]
#[command(name = "research-cli")]
#[command(about = "Multi-page research jobs over ingested documents")]
#[command(version)]
struct Cli {
    /// RON configuration file; a missing file means defaults
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,

    /// Also write `research.log` into this directory
    #[arg(long, global = true, env = "RESEARCH_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research job over every segment of a document
    Research(ResearchArgs),
    /// Show the status of a job
    Status(StatusArgs),
    /// List all known jobs
    List(ListArgs),
}

#[derive(Args, Debug)]
struct ResearchArgs {
    document_id: String,
    query: String,
    #[arg(long)]
    index_id: String,
    #[arg(long)]
    job_id: Option<String>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_concurrent: Option<usize>,
    #[arg(long, env = "RESEARCH_MAX_COST")]
    max_cost: Option<f64>,
    #[arg(long, env = "RESEARCH_MAX_INPUT_TOKENS")]
    max_input_tokens: Option<u64>,
    #[arg(long, env = "RESEARCH_EVIDENCE_PATH")]
    evidence_path: Option<PathBuf>,
    #[arg(long, env = "RESEARCH_DOCUMENTS_PATH")]
    documents_path: Option<PathBuf>,
    #[arg(long, env = "RESEARCH_LLM_ENDPOINT")]
    llm_endpoint: Option<String>,
    #[arg(long, env = "RESEARCH_LLM_MODEL")]
    llm_model: Option<String>,
    #[arg(long, env = "RESEARCH_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,
    /// Write the full outcome as JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    job_id: String,
    #[arg(long)]
    index_id: Option<String>,
    #[arg(long, env = "RESEARCH_EVIDENCE_PATH")]
    evidence_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, env = "RESEARCH_EVIDENCE_PATH")]
    evidence_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` is a handled failure: the job failed or the lookup found nothing.
async fn run(cli: Cli) -> Result<bool> {
    let mut config = load_config(&cli.config);
    match cli.command {
        Command::Research(args) => {
            config.apply(ConfigOverrides {
                evidence_path: args.evidence_path.clone(),
                documents_path: args.documents_path.clone(),
                llm_endpoint: args.llm_endpoint.clone(),
                llm_model: args.llm_model.clone(),
                llm_api_key: args.llm_api_key.clone(),
            });
            commands::research(&config, commands::ResearchInvocation {
                document_id: args.document_id,
                query: args.query,
                index_id: args.index_id,
                job_id: args.job_id,
                workers: args.workers,
                batch_size: args.batch_size,
                max_concurrent: args.max_concurrent,
                max_cost: args.max_cost,
                max_input_tokens: args.max_input_tokens,
                output: args.output,
            })
            .await
        }
        Command::Status(args) => {
            config.apply(ConfigOverrides {
                evidence_path: args.evidence_path,
                ..ConfigOverrides::default()
            });
            commands::status(&config, &args.job_id, args.index_id.as_deref())
        }
        Command::List(args) => {
            config.apply(ConfigOverrides {
                evidence_path: args.evidence_path,
                ..ConfigOverrides::default()
            });
            commands::list(&config)
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let destination = match &cli.log_dir {
        Some(dir) => LogDestination::Both(dir.clone()),
        None => LogDestination::Terminal,
    };
    research_logging::initialize(destination, level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn research_flags_parse() {
        let cli = Cli::try_parse_from([
            "research-cli",
            "research",
            "doc-7",
            "what changed?",
            "--index-id",
            "idx",
            "--workers",
            "2",
            "--batch-size",
            "10",
            "--max-cost",
            "2.5",
            "--output",
            "out.json",
        ])
        .unwrap();
        let Command::Research(args) = cli.command else {
            panic!("expected research subcommand");
        };
        assert_eq!(args.document_id, "doc-7");
        assert_eq!(args.query, "what changed?");
        assert_eq!(args.index_id, "idx");
        assert_eq!(args.workers, Some(2));
        assert_eq!(args.batch_size, Some(10));
        assert_eq!(args.max_cost, Some(2.5));
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn research_requires_an_index_id() {
        let result = Cli::try_parse_from(["research-cli", "research", "doc-7", "query"]);
        assert!(result.is_err());
    }
}
