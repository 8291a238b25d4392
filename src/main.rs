use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use punch_clock::client::{AttendanceClient, HttpAttendanceClient};
use punch_clock::config::AppConfig;
use punch_clock::engine::{PunchDirection, PunchEngine, PunchOutcome};
use punch_clock::geo::{FixedGeolocation, GeolocationSource, NoGeolocation};
use punch_clock::models::PunchState;
use punch_clock::notify::LogNotifier;
use punch_clock::{clock::SystemClock, format_hm, format_hms};

#[derive(Parser)]
#[command(name = "punch-clock")]
#[command(about = "Punch tracking against a remote attendance service")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Employee id (overrides the config file)
    #[arg(long)]
    employee_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the current punch status
    Status,

    /// Record a check-in
    CheckIn,

    /// Record a check-out
    CheckOut,

    /// Keep a live view of the running punch until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting punch-clock v{}", env!("CARGO_PKG_VERSION"));

    let config_path = PathBuf::from(&cli.config);
    let mut config = if config_path.exists() {
        AppConfig::from_file(&config_path)?
    } else {
        tracing::debug!("No config file at {}, using defaults", cli.config);
        AppConfig::default()
    };
    if cli.employee_id.is_some() {
        config.employee_id = cli.employee_id.clone();
    }

    let engine = build_engine(&config)?;

    match cli.command {
        Commands::Status => {
            engine.reconcile_once().await?;
            print_state(&engine.state().await);
        }
        Commands::CheckIn => {
            punch(&engine, PunchDirection::In).await?;
        }
        Commands::CheckOut => {
            punch(&engine, PunchDirection::Out).await?;
        }
        Commands::Watch => {
            let handle = Arc::clone(&engine).spawn();

            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        render_live_line(&engine.state().await);
                    }
                }
            }

            println!();
            handle.shutdown();
            tracing::info!("Stopped watching");
        }
    }

    Ok(())
}

fn build_engine(config: &AppConfig) -> Result<Arc<PunchEngine>> {
    let client: Arc<dyn AttendanceClient> = Arc::new(HttpAttendanceClient::new(
        &config.service.base_url,
        Duration::from_secs(config.service.timeout_seconds),
    )?);

    let geo: Arc<dyn GeolocationSource> = match config.geolocation {
        Some(g) => Arc::new(FixedGeolocation::new(g.latitude, g.longitude)),
        None => Arc::new(NoGeolocation),
    };

    Ok(Arc::new(PunchEngine::new(
        config.engine_options(),
        client,
        geo,
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
    )))
}

async fn punch(engine: &Arc<PunchEngine>, direction: PunchDirection) -> Result<()> {
    match Arc::clone(engine).punch(direction).await? {
        PunchOutcome::Applied => {
            // Confirm against server truth before printing.
            if let Err(e) = engine.reconcile_once().await {
                tracing::warn!("Confirming reconciliation failed: {}", e);
            }
            print_state(&engine.state().await);
        }
        PunchOutcome::Ignored => {
            println!("A punch is already in progress; nothing submitted.");
        }
    }
    Ok(())
}

fn print_state(state: &PunchState) {
    let status = if !state.loaded {
        "unknown"
    } else if state.is_checked_in {
        "checked in"
    } else {
        "checked out"
    };

    println!("\n=== Punch Status ===");
    println!("Status:       {}", status);
    if let Some(at) = state.check_in_at {
        println!("Checked in:   {}", at.format("%H:%M:%S"));
    }
    if let Some(at) = state.check_out_at {
        println!("Checked out:  {}", at.format("%H:%M:%S"));
    }
    println!("Worked:       {}", format_hms(state.working_duration.as_secs()));
    println!("Schedule:     {}", format_hm(state.expected_work_minutes));
    match state.remaining_minutes {
        Some(minutes) => println!("Remaining:    {}", format_hm(minutes)),
        None => println!("Remaining:    unknown"),
    }
    match state.overtime_minutes {
        Some(minutes) => println!("Overtime:     {}", format_hm(minutes)),
        None => println!("Overtime:     unknown"),
    }
}

fn render_live_line(state: &PunchState) {
    let status = if !state.loaded {
        "loading..."
    } else if state.is_checked_in {
        "IN "
    } else {
        "OUT"
    };

    print!(
        "\r[{}] worked {}  remaining {}   ",
        status,
        format_hms(state.working_duration.as_secs()),
        state
            .remaining_minutes
            .map(format_hm)
            .unwrap_or_else(|| "--:--".to_string()),
    );
    let _ = std::io::stdout().flush();
}
