use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use qaflow_e::backend::{WebDriverFactory, WebDriverSession};
use qaflow_engine::backend::SessionProvider;
use qaflow_engine::cli::{self, OutputHandlers, PlanOptions};
use qaflow_engine::config::{ConfigLoader, Environment, QaflowConfig};
use qaflow_engine::report::SuiteReport;
use qaflow_engine::runner::FailurePolicy;
use qaflow_engine::suite::{PlannedCase, run_parallel, run_sequential};
use qaflow_engine::totp::SystemTotp;
use qaflow_h::backend::{HeadlessFactory, HeadlessSession};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qaflow", version, about = "Runs declarative browser test suites")]
struct Args {
    /// Config file (default: ./qaflow.yaml, then ~/.qaflow/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target environment, overriding the config file
    #[arg(long, global = true)]
    env: Option<Environment>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute suite files
    Run(RunArgs),
    /// Validate suite files and locator references without a browser
    Check {
        #[arg(long)]
        locators: Option<PathBuf>,
        #[arg(required = true)]
        suites: Vec<String>,
    },
    /// Print the current authenticator code
    Totp {
        /// Portal whose configured totp_secret to use
        #[arg(long, conflicts_with = "secret", required_unless_present = "secret")]
        portal: Option<String>,
        /// Base32 secret given directly
        #[arg(long)]
        secret: Option<String>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    #[arg(long, value_enum, default_value_t = BackendKind::Headless)]
    backend: BackendKind,

    /// Launch the browser with a window
    #[arg(long)]
    visible: bool,

    /// WebDriver endpoint for the webdriver backend
    #[arg(long)]
    driver_url: Option<String>,

    /// stop-on-failure or continue-on-failure; overrides suite manifests
    #[arg(long)]
    policy: Option<FailurePolicy>,

    /// Portal for suites that do not name one
    #[arg(long)]
    portal: Option<String>,

    #[arg(long)]
    locators: Option<PathBuf>,

    /// JSON report path (default: <report_dir>/report.json)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run cases concurrently, one browser each. Without a value uses run.max_parallel.
    #[arg(long, num_args = 0..=1, default_missing_value = "0")]
    parallel: Option<usize>,

    /// Suite files or glob patterns
    #[arg(required = true)]
    suites: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Chromium over CDP
    Headless,
    /// Any W3C WebDriver server
    Webdriver,
}

const OUTPUT: OutputHandlers = OutputHandlers {
    out: |msg| println!("{}", msg),
    err: |msg| eprintln!("{}", msg),
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the report.
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await?,
        None => ConfigLoader::load_default().await?,
    };
    if let Some(env) = args.env {
        config.environment = env;
    }
    info!(environment = %config.environment, "Configuration loaded");

    match args.command {
        Command::Run(run) => run_suites(&config, run).await,
        Command::Check { locators, suites } => {
            let suites = cli::load_suites(&suites).await?;
            let locators = cli::load_locators(&config, locators.as_deref()).await?;
            cli::build_plan(&config, Arc::new(locators.clone()), &suites, &PlanOptions::default())?;
            let issues = cli::check_suites(&suites, &locators, OUTPUT);
            Ok(if issues.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Totp { portal, secret } => {
            let secret = match (secret, portal) {
                (Some(secret), _) => secret,
                (None, Some(portal)) => config
                    .portals
                    .get(&portal)
                    .and_then(|p| p.totp_secret.clone())
                    .with_context(|| {
                        format!("No totp_secret configured for portal '{}'", portal)
                    })?,
                (None, None) => bail!("Pass --portal or --secret"),
            };
            let now = SystemTotp::now_secs()?;
            let code = SystemTotp::code_at(&secret, now)?;
            (OUTPUT.out)(&format!(
                "{} (valid for {}s)",
                code,
                SystemTotp::seconds_remaining(now)
            ));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_suites(config: &QaflowConfig, run: RunArgs) -> anyhow::Result<ExitCode> {
    if run.backend == BackendKind::Headless && run.driver_url.is_some() {
        bail!("--driver-url only applies to --backend webdriver");
    }

    let suites = cli::load_suites(&run.suites).await?;
    let locators = Arc::new(cli::load_locators(config, run.locators.as_deref()).await?);
    let options = PlanOptions {
        policy: run.policy,
        portal: run.portal.clone(),
    };
    let plan = cli::build_plan(config, locators, &suites, &options)?;
    info!(cases = plan.len(), "Planned run");

    let cancel = cli::cancel_on_ctrl_c(OUTPUT);
    let report = match run.parallel {
        Some(requested) => {
            let limit = if requested == 0 {
                config.run.max_parallel
            } else {
                requested
            };
            match run.backend {
                BackendKind::Headless => {
                    let factory = Arc::new(HeadlessFactory::new(run.visible));
                    run_parallel(factory, plan, limit, &cancel).await
                }
                BackendKind::Webdriver => {
                    let factory =
                        Arc::new(WebDriverFactory::new(run.driver_url.clone(), run.visible));
                    run_parallel(factory, plan, limit, &cancel).await
                }
            }
        }
        None => {
            let provider: Box<dyn SessionProvider> = match run.backend {
                BackendKind::Headless => Box::new(HeadlessSession::new_with_visibility(run.visible)),
                BackendKind::Webdriver => {
                    let session = match run.driver_url.clone() {
                        Some(url) => WebDriverSession::with_url(url),
                        None => WebDriverSession::new(),
                    };
                    Box::new(session.visible(run.visible))
                }
            };
            run_on_one_session(provider, &plan, &cancel).await
        }
    };

    cli::emit_report(OUTPUT, &report);
    let report_path = run.report.unwrap_or_else(|| cli::default_report_path(config));
    if let Err(e) = cli::write_report(&report_path, &report).await {
        error!("Failed to write report to {}: {}", report_path.display(), e);
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}

async fn run_on_one_session(
    mut provider: Box<dyn SessionProvider>,
    plan: &[PlannedCase],
    cancel: &CancellationToken,
) -> SuiteReport {
    if let Err(e) = provider.launch().await {
        error!("Failed to launch session: {}", e);
        return SuiteReport {
            not_run: plan.iter().map(|p| p.case.name.clone()).collect(),
            fatal_error: Some(e.to_string()),
            ..SuiteReport::default()
        };
    }

    let report = run_sequential(&mut *provider, plan, cancel).await;
    if let Err(e) = provider.close().await {
        error!("Failed to close session: {}", e);
    }
    report
}
