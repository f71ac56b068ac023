use clap::Parser;
mod commands;
use commands::cli;
use resilient_core::config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> anyhow::Result<i32> {
    let args = cli::Args::parse();
    let cfg = match args.config.as_deref() {
        Some(path) => config::load_from_path(path),
        None => config::load_default(),
    }
    .map_err(|e| e.context(ConfigFailure))?;
    init_tracing(&cfg.logging).map_err(anyhow::Error::msg)?;

    match args.command {
        cli::Commands::Demo(demo_args) => commands::demo::run(demo_args, &cfg).await,
        cli::Commands::Classify(classify_args) => commands::inspect::classify(classify_args),
        cli::Commands::Delays(delay_args) => commands::inspect::delays(delay_args, &cfg),
        cli::Commands::Config => commands::inspect::show_config(&cfg),
    }
}

/// Marker context attached to configuration failures.
#[derive(Debug)]
struct ConfigFailure;

impl std::fmt::Display for ConfigFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("configuration error")
    }
}

fn exit_code_for_error(e: &anyhow::Error) -> i32 {
    // 0: success
    // 1: batch finished with hard failures (returned as a normal exit code)
    // 11: config error
    // 50: internal/uncategorized
    if e.downcast_ref::<ConfigFailure>().is_some() {
        11
    } else {
        50
    }
}

fn init_tracing(logging: &config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("resilient"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("resilient.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
