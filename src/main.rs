use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use tollgate_approve::client::WerckerClient;
use tollgate_approve::orchestrator::{ApprovalTarget, Orchestrator};
use tollgate_core::{OutputFormat, TollgateConfig};

#[derive(Parser)]
#[command(
    name = "tollgate",
    version,
    about = "Approve a manually-gated Wercker pipeline run for a commit",
    long_about = "Approve a manually-gated Wercker pipeline run for a commit.\n\n\
                   Finds the run of <PIPELINE> for <COMMIT_HASH> in <USERNAME>/<APPLICATION>.\n\
                   If it is waiting for approval and its source run passed, it is approved.\n\
                   If no run is waiting, a new run is triggered and then approved.\n\n\
                   Examples:\n  \
                     tollgate alice shop deploy-prod 3f2a9c1 $WERCKER_TOKEN\n  \
                     tollgate alice shop deploy-prod 3f2a9c1 $WERCKER_TOKEN --branch main\n  \
                     tollgate alice shop deploy-prod 3f2a9c1 $WERCKER_TOKEN --format json"
)]
struct Cli {
    /// User or organization that owns the application
    username: String,

    /// Application name
    application: String,

    /// Name of the pipeline to approve
    pipeline: String,

    /// Commit hash whose run should be approved
    commit_hash: String,

    /// Wercker API token
    token: String,

    /// Path to configuration file (default: .tollgate.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Branch to use when a new run has to be triggered (default: master)
    #[arg(long)]
    branch: Option<String>,

    /// Build service URL (default: https://app.wercker.com)
    #[arg(long)]
    base_url: Option<String>,

    /// Output format
    #[arg(
        long,
        default_value = "text",
        long_help = "Output format for the final outcome.\n\n\
                       Formats:\n  \
                         text  Status lines on stdout (default)\n  \
                         json  Outcome as JSON on stdout; status lines move to stderr"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "tollgate=debug,tollgate_approve=debug"
    } else {
        "tollgate=info,tollgate_approve=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TollgateConfig> {
    let config = match path {
        Some(path) => TollgateConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".tollgate.toml");
            if default_path.exists() {
                TollgateConfig::from_file(default_path)?
            } else {
                TollgateConfig::default()
            }
        }
    };
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    // Usage and failure reports both go to stdout with a single exit status.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            print!("{err}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            print!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            println!("{report:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(branch) = cli.branch {
        config.service.branch = branch;
    }
    if let Some(base_url) = cli.base_url {
        config.service.base_url = base_url;
    }
    config.service.validate()?;
    tracing::debug!(base_url = %config.service.base_url, branch = %config.service.branch, "resolved configuration");

    let client = WerckerClient::new(cli.token, &config.service)?;
    let target = ApprovalTarget {
        username: cli.username,
        application: cli.application,
        pipeline: cli.pipeline,
        commit_hash: cli.commit_hash,
        branch: config.service.branch,
        trigger_message: config.service.trigger_message,
    };

    let progress: Box<dyn Write> = match cli.format {
        OutputFormat::Text => Box::new(std::io::stdout()),
        OutputFormat::Json => Box::new(std::io::stderr()),
    };
    let mut orchestrator = Orchestrator::new(client, target, progress);
    let outcome = orchestrator.run().await?;

    match cli.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).into_diagnostic()?
            );
        }
        OutputFormat::Text => {
            println!("{outcome}");
        }
    }

    Ok(())
}
