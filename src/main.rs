use std::process::ExitCode;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ig_scan::{
    Cli, Config, ConfigManager, ErrorReporter, Output, ProgressCallback, SarifLog, ScanError,
    ValidationEngine, ValidationPhase, ValidationProgress, ValidationRun, VerbosityLevel,
    convert_log,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(2);
    }

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            ErrorReporter::new(cli.verbosity()).report_config_error(&e);
            return ExitCode::from(2);
        }
    };

    let verbosity = if cli.debug {
        VerbosityLevel::Debug
    } else {
        config.verbosity()
    };
    init_tracing(verbosity);

    match run(&cli, &config, verbosity).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let reporter = ErrorReporter::new(verbosity);
            match e.downcast_ref::<ScanError>() {
                Some(scan_error) => reporter.report_scan_error(scan_error),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "info",
        VerbosityLevel::Debug => "debug",
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ig_scan={}", level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

async fn run(cli: &Cli, config: &Config, verbosity: VerbosityLevel) -> anyhow::Result<u8> {
    let run = match &cli.error_log {
        Some(error_log) => convert_log(error_log).await?,
        None => scan(cli, config, verbosity).await?,
    };

    let report_path = &config.output.report;
    SarifLog::from_run(&run)?.write_to(report_path).await?;

    print!("{}", Output::new(verbosity).format_run(&run, report_path));
    Ok(run.exit_code())
}

async fn scan(
    cli: &Cli,
    config: &Config,
    verbosity: VerbosityLevel,
) -> Result<ValidationRun, ScanError> {
    let xml_discovery = config.xml_discovery()?;
    let script_discovery = config.script_discovery()?;
    let engine = ValidationEngine::new(config.engine_config())?;

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, letting running validations finish");
            token.cancel();
        }
    });

    info!(
        root = %cli.root.display(),
        threads = engine.config().max_concurrent_validations,
        "starting scan"
    );

    engine
        .scan_with_progress(
            &cli.root,
            &xml_discovery,
            &script_discovery,
            progress_callback(verbosity),
        )
        .await
}

/// Progress line on an interactive stderr; log output replaces it at higher verbosity.
fn progress_callback(verbosity: VerbosityLevel) -> Option<ProgressCallback> {
    if verbosity != VerbosityLevel::Normal || !atty::is(atty::Stream::Stderr) {
        return None;
    }

    let reporter = Arc::new(ErrorReporter::new(verbosity));
    Some(Arc::new(move |progress: ValidationProgress| {
        if progress.phase == ValidationPhase::Validation {
            reporter.report_progress(
                progress.completed,
                progress.total,
                progress.current_file.as_deref(),
            );
        }
    }))
}
