//! Scramble runner (clipduel-scramble) - Main entry point
//!
//! Headless runner for the Scramble session engine: creates a session
//! against the configured backend, plays it with simulated media and a
//! scripted player, and prints each result card plus the final summary.
//! Used for backend smoke testing.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipduel_scramble::api::{ApiContext, HttpBackend, ScrambleBackend};
use clipduel_scramble::config::{LoggingConfig, ScrambleConfig};
use clipduel_scramble::duel::TracingHaptics;
use clipduel_scramble::media::{ClipProfile, LoadBehavior, SimulatedMediaBackend};
use clipduel_scramble::session::{
    drive, MomentCard, PickStrategy, ResultCardView, ScrambleSession, SessionReport, UserInput,
};

/// Command-line arguments for clipduel-scramble
#[derive(Parser, Debug)]
#[command(name = "clipduel-scramble")]
#[command(about = "Headless runner for the ClipDuel Scramble session engine")]
#[command(version)]
struct Args {
    /// Config file (overrides CLIPDUEL_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, env = "CLIPDUEL_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "CLIPDUEL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Restrict the session to one sport
    #[arg(long, env = "CLIPDUEL_SPORT")]
    sport: Option<String>,

    /// Which clip to vote for: top, bottom or alternate
    #[arg(long, default_value = "alternate")]
    pick: PickStrategy,

    /// Print the reference sports list and exit
    #[arg(long)]
    list_sports: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Print every session event as a JSON line
    #[arg(long)]
    events: bool,

    /// Simulated clip length in seconds
    #[arg(long, default_value = "6.0")]
    clip_secs: f64,

    /// Simulated load latency in milliseconds
    #[arg(long, default_value = "400")]
    load_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ScrambleConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(args.api_url.clone(), args.token.clone(), args.sport.clone());

    init_tracing(&config.logging)?;
    info!(
        "clipduel-scramble {} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("CLIPDUEL_GIT_HASH"),
        env!("CLIPDUEL_BUILD_TIMESTAMP"),
        env!("CLIPDUEL_BUILD_PROFILE")
    );

    if args.dump_config {
        let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    info!("Backend: {}", config.api.base_url);
    let backend = Arc::new(
        HttpBackend::new(ApiContext::from_config(&config.api))
            .context("Failed to initialize backend client")?,
    );

    if args.list_sports {
        let sports = backend
            .fetch_sports()
            .await
            .context("Failed to fetch sports list")?;
        for sport in sports {
            match sport.slug {
                Some(slug) => println!("{} ({})", sport.name, slug),
                None => println!("{}", sport.name),
            }
        }
        return Ok(());
    }

    let clip_secs = args.clip_secs.max(0.1);
    let media = Arc::new(SimulatedMediaBackend::new(ClipProfile {
        load_latency: Duration::from_millis(args.load_ms),
        duration: Duration::from_secs_f64(clip_secs),
        behavior: LoadBehavior::Ready,
    }));

    let session = ScrambleSession::new(backend, media, Arc::new(TracingHaptics), config);
    let views = session.subscribe_view();

    if args.events {
        let mut events = session.events().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
                }
            }
        });
    }

    let (input_tx, input_rx) = mpsc::channel(16);
    let quit_tx = input_tx.clone();
    let patience = Duration::from_secs_f64(clip_secs * 3.0);
    let pilot = tokio::spawn(drive(views, input_tx, args.pick.clone(), patience));

    let run = session.run(input_rx);
    tokio::pin!(run);
    let report = tokio::select! {
        report = &mut run => report,
        _ = shutdown_signal() => {
            let _ = quit_tx.send(UserInput::Quit).await;
            (&mut run).await
        }
    };
    drop(quit_tx);

    let log = pilot.await.context("Autopilot task failed")?;
    for card in &log.result_cards {
        print_result_card(card);
    }
    print_summary(&report);

    if let Some(failure) = &report.failure {
        if failure.auth_required {
            bail!("Authentication required: {}", failure.reason);
        }
        bail!("Session could not be created: {}", failure.reason);
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "clipduel_scramble={level},clipduel_common={level}",
            level = logging.level
        )
        .into()
    });

    let (stderr_layer, file_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn print_result_card(card: &ResultCardView) {
    println!(
        "Round {}/{}: {} beat {}",
        card.round_index + 1,
        card.total_rounds,
        card_name(&card.winner),
        card_name(&card.loser)
    );
    print_side("winner", &card.winner);
    print_side("loser", &card.loser);
}

fn card_name(card: &MomentCard) -> String {
    if card.title.is_empty() {
        format!("#{}", card.moment_id)
    } else {
        format!("{} (#{})", card.title, card.moment_id)
    }
}

fn print_side(label: &str, card: &MomentCard) {
    let after = card
        .rating_after
        .map(|r| r.to_string())
        .unwrap_or_else(|| "?".to_string());
    let delta = card
        .rating_delta
        .map(|d| format!(" ({:+})", d))
        .unwrap_or_default();
    let rank = card.rank_label();
    println!(
        "  {:<6} rating {} -> {}{}, rank {}, tier {}, win rate {}%",
        label,
        card.rating_before,
        after,
        delta,
        if rank.is_empty() { "-" } else { rank.as_str() },
        card.tier,
        card.win_rate_percent
    );
}

fn print_summary(report: &SessionReport) {
    let session = report
        .session_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "Session {}: {} after {} rounds ({} submissions accepted, {} failed)",
        session,
        report.final_phase,
        report.rounds_played,
        report.submissions_accepted,
        report.submissions_failed
    );
    for entry in &report.league_table {
        println!(
            "  #{} {} {} {}",
            entry.rank.map(|r| r.to_string()).unwrap_or_default(),
            entry.title.as_deref().unwrap_or(""),
            entry.team.as_deref().unwrap_or(""),
            entry.rating.map(|r| format!("{:.0}", r)).unwrap_or_default()
        );
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, quitting session");
        },
        _ = terminate => {
            info!("Received terminate signal, quitting session");
        },
    }
}
