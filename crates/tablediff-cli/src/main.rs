//! tablediff CLI - find differing rows between two tables across databases.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tablediff::config::TableConfig;
use tablediff::error::EXIT_DIFFERENCES_FOUND;
use tablediff::{drivers, Config, DiffError, TableDiffer, TableSegment};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "tablediff")]
#[command(about = "Find differing rows between two tables, across databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "diff.yaml")]
    config: PathBuf,

    /// Output JSON lines to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the two configured tables and print every differing row
    Diff {
        /// Stop after this many differences
        #[arg(long)]
        limit: Option<usize>,

        /// Override diff.bisection_threshold
        #[arg(long)]
        threshold: Option<usize>,

        /// Override diff.bisection_factor
        #[arg(long)]
        factor: Option<usize>,

        /// Override diff.max_concurrency
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Print run statistics to stderr when done
        #[arg(long)]
        stats: bool,
    },

    /// Validate the configuration file without connecting
    CheckConfig,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, DiffError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| DiffError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::CheckConfig => {
            if cli.output_json {
                let summary = serde_json::json!({
                    "valid": true,
                    "table1": config.table1.table,
                    "database1": config.table1.database.display_name(),
                    "table2": config.table2.table,
                    "database2": config.table2.database.display_name(),
                    "columns": config.table1.columns.len(),
                    "bisection_threshold": config.diff.get_bisection_threshold(),
                    "bisection_factor": config.diff.get_bisection_factor(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Configuration is valid:");
                println!(
                    "  table1: {} on {}",
                    config.table1.table,
                    config.table1.database.display_name()
                );
                println!(
                    "  table2: {} on {}",
                    config.table2.table,
                    config.table2.database.display_name()
                );
                println!("  columns: {}", config.table1.columns.len());
            }
            Ok(0)
        }

        Commands::HealthCheck => health_check(&config, cli.output_json).await,

        Commands::Diff {
            limit,
            threshold,
            factor,
            max_concurrency,
            stats,
        } => {
            if let Some(t) = threshold {
                config.diff.bisection_threshold = Some(t);
            }
            if let Some(f) = factor {
                config.diff.bisection_factor = Some(f);
            }
            if let Some(c) = max_concurrency {
                config.diff.max_concurrency = Some(c);
            }
            config.validate()?;
            let config = config.with_auto_tuning();

            let cancel_token = setup_signal_handler().await?;
            diff(&config, limit, stats, cli.output_json, cancel_token).await
        }
    }
}

async fn open_segment(config: &Config, table: &TableConfig) -> Result<TableSegment, DiffError> {
    let db = drivers::connect(&table.database).await?;
    TableSegment::new(
        db,
        table.table_path()?,
        config.key_column_for(table),
        None,
        table.columns.clone(),
    )
}

async fn diff(
    config: &Config,
    limit: Option<usize>,
    print_stats: bool,
    output_json: bool,
    cancel_token: CancellationToken,
) -> Result<u8, DiffError> {
    let (a, b) = futures::try_join!(
        open_segment(config, &config.table1),
        open_segment(config, &config.table2)
    )?;

    let differ = TableDiffer::new(
        config.diff.get_bisection_threshold(),
        config.diff.get_bisection_factor(),
        config.diff.get_max_concurrency(),
    )?
    .with_registry(config.registry())
    .with_timestamp_precision(config.diff.get_timestamp_precision())?;

    let start = Instant::now();
    let mut stream = differ.diff_tables(&a, &b).await?;
    let mut found = 0usize;

    let outcome = loop {
        if limit.is_some_and(|n| found >= n) {
            info!("Stopping after {} differences", found);
            break Ok(());
        }

        let next = tokio::select! {
            _ = cancel_token.cancelled() => break Err(DiffError::Cancelled),
            next = stream.try_next() => next,
        };

        match next {
            Ok(Some(event)) => {
                found += 1;
                if output_json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("{}", event);
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let stats = stream.statistics();
    drop(stream);
    futures::join!(a.database().close(), b.database().close());

    if print_stats {
        if output_json {
            eprintln!("{}", serde_json::to_string(&stats)?);
        } else {
            eprintln!(
                "{} ({:.2}s)",
                stats,
                start.elapsed().as_secs_f64()
            );
        }
    }

    outcome?;
    Ok(if found > 0 { EXIT_DIFFERENCES_FOUND } else { 0 })
}

async fn health_check(config: &Config, output_json: bool) -> Result<u8, DiffError> {
    let (one, two) = futures::join!(
        check_side(&config.table1),
        check_side(&config.table2)
    );
    let healthy = one.error.is_none() && two.error.is_none();

    if output_json {
        let result = serde_json::json!({
            "healthy": healthy,
            "table1": one.to_json(),
            "table2": two.to_json(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Health Check Results:");
        for (label, side) in [("table1", &one), ("table2", &two)] {
            println!(
                "  {} ({}): {} ({}ms)",
                label,
                side.name,
                if side.error.is_none() { "OK" } else { "FAILED" },
                side.latency_ms
            );
            if let Some(ref err) = side.error {
                println!("    Error: {}", err);
            }
        }
        println!(
            "\n  Overall: {}",
            if healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !healthy {
        return Err(DiffError::pool("Health check failed", "health-check"));
    }
    Ok(0)
}

struct SideHealth {
    name: String,
    latency_ms: u128,
    error: Option<String>,
}

impl SideHealth {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "database": self.name,
            "connected": self.error.is_none(),
            "latency_ms": self.latency_ms,
            "error": self.error,
        })
    }
}

async fn check_side(table: &TableConfig) -> SideHealth {
    let start = Instant::now();
    let result = async {
        let db = drivers::connect(&table.database).await?;
        db.ping().await?;
        db.describe_table(&table.table_path()?).await?;
        db.close().await;
        Ok::<_, DiffError>(())
    }
    .await;

    SideHealth {
        name: table.database.display_name(),
        latency_ms: start.elapsed().as_millis(),
        error: result.err().map(|e| e.to_string()),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Differences go to stdout; logs stay on stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, DiffError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping diff...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Ctrl-C only on platforms without Unix signals.
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, DiffError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping diff...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
