use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{Level, info, warn};

mod http;
mod hub;
mod manager;
mod ws;

use hub::Hub;
use manager::{Manager, RoomDefaults};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);
const CAMPFIRE_INTERVAL: Duration = Duration::from_secs(2);
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

fn usage_and_exit() -> ! {
    eprintln!(
        "ember_server\n\n\
USAGE:\n  ember_server [--bind HOST:PORT] [--dir PATH] [--countdown SECS] [--no-tickets]\n\n\
ENV:\n  BIND        default 0.0.0.0:8080\n  STATIC_DIR  default webdist\n  COUNTDOWN   default 3 (1..=30)\n  TICKETS     set to 0 to disable the ticket queue\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    static_dir: PathBuf,
    countdown: u32,
    tickets_enabled: bool,
}

fn parse_countdown(v: &str) -> u32 {
    let n: u32 = v.parse().unwrap_or_else(|_| usage_and_exit());
    if !(1..=30).contains(&n) {
        usage_and_exit();
    }
    n
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("BIND")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut static_dir: PathBuf = std::env::var("STATIC_DIR")
        .unwrap_or_else(|_| "webdist".to_string())
        .into();

    let mut countdown: u32 = std::env::var("COUNTDOWN")
        .map(|v| parse_countdown(&v))
        .unwrap_or(3);

    let mut tickets_enabled = std::env::var("TICKETS").map_or(true, |v| v != "0");

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--dir" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                static_dir = v.into();
            }
            "--countdown" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                countdown = parse_countdown(&v);
            }
            "--no-tickets" => {
                tickets_enabled = false;
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        static_dir,
        countdown,
        tickets_enabled,
    }
}

#[derive(Clone)]
struct AppState {
    hub: Arc<Hub>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();

    let manager = Manager::new(RoomDefaults {
        countdown: cfg.countdown,
        tickets_enabled: cfg.tickets_enabled,
    });
    let hub = Arc::new(Hub::new(manager));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
        info!("shutdown signal received");
    });

    // TTL sweeper.
    {
        let hub = hub.clone();
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let removed = hub.rooms().cleanup().await;
                        if removed > 0 {
                            info!(removed = removed, "expired rooms swept");
                        }
                    }
                    _ = rx.changed() => return,
                }
            }
        });
    }

    // Campfire upkeep. Safe to skip ticks under load; every pass is
    // idempotent.
    {
        let hub = hub.clone();
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(CAMPFIRE_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        for room_id in hub.rooms().normalize_campfire_rooms().await {
                            hub.broadcast(&room_id, "campfire_tick").await;
                        }
                    }
                    _ = rx.changed() => return,
                }
            }
        });
    }

    let app = http::router(AppState { hub }, &cfg.static_dir);
    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;

    info!(
        bind = %cfg.bind,
        static_dir = %cfg.static_dir.display(),
        countdown = cfg.countdown,
        tickets_enabled = cfg.tickets_enabled,
        "ember server listening"
    );

    let mut drain_rx = shutdown_rx.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    tokio::select! {
        res = serve => {
            res.context("http server failed")?;
        }
        // Long-lived sockets don't close on their own; give in-flight work a
        // bounded drain after the signal, then stop.
        _ = async {
            wait_for_shutdown_mut(&mut drain_rx).await;
            tokio::time::sleep(DRAIN_DEADLINE).await;
        } => {
            warn!("drain deadline reached, closing remaining sessions");
        }
    }

    info!("server stopped");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    wait_for_shutdown_mut(&mut rx).await;
}

async fn wait_for_shutdown_mut(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
