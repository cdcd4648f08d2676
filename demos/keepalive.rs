//! Runs a keepalive timer against a simulated peer that answers the
//! first few pings and then goes silent.
//!
//! ```text
//! RUST_LOG=debug cargo run --example keepalive
//! ```

mod keepalive_manager;

use keepalive_manager::{KeepaliveConfig, KeepaliveManager};

use cohort::engine::EngineBuilder;
use cohort::party::PartyBuilder;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ANSWERED_PINGS: usize = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let engine = EngineBuilder::new().thread_name("keepalive-timers").build()?;
    let party = PartyBuilder::new("connection")
        .scheduler(engine.scheduler())
        .build();

    let (ping_tx, ping_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel();

    let config = KeepaliveConfig {
        interval: Duration::from_millis(100),
        timeout: Duration::from_millis(250),
    };

    let manager = KeepaliveManager::spawn(
        &party,
        engine.handle(),
        config,
        move || {
            ping_tx
                .send(())
                .map_err(|_| keepalive_manager::KeepaliveError::TransportClosed)
        },
        move |result| {
            let _ = done_tx.send(result);
        },
    );

    let peer = manager.clone();
    thread::spawn(move || {
        for (count, ()) in ping_rx.iter().enumerate() {
            if count < ANSWERED_PINGS {
                info!(ping = count + 1, "peer answers");
                thread::sleep(Duration::from_millis(20));
                peer.got_data();
            } else {
                info!(ping = count + 1, "peer stays silent");
            }
        }
    });

    match done_rx.recv()? {
        Ok(()) => info!("keepalive stopped"),
        Err(err) => info!(error = %err, "connection declared dead"),
    }

    manager.stop();
    Ok(())
}
