//! A connection keepalive timer assembled from promise combinators.
//!
//! Every `interval` the manager checks whether any data arrived since
//! the previous check. If the connection was idle it sends a ping and
//! races the next incoming data against `timeout`; losing that race
//! ends the loop with [`KeepaliveError::Timeout`].

#![allow(dead_code)]

use cohort::combinator::{LoopCtl, if_then, loop_promise, map, race, seq, try_seq};
use cohort::engine::EngineHandle;
use cohort::party::Party;
use cohort::promise::{Promise, immediate};
use cohort::sync::Observable;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeepaliveError {
    #[error("no data received within the keepalive timeout")]
    Timeout,

    #[error("transport refused the keepalive ping")]
    TransportClosed,
}

#[derive(Debug, Clone, Copy)]
pub struct KeepaliveConfig {
    /// Time between idleness checks.
    pub interval: Duration,

    /// How long to wait for data after a ping.
    pub timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Handle to a running keepalive participant.
///
/// Cloning shares the same timer.
#[derive(Clone)]
pub struct KeepaliveManager {
    received: Arc<AtomicU64>,
    data: Observable<u64>,
    stopped: Observable<bool>,
}

impl KeepaliveManager {
    /// Spawns the keepalive loop on `party`.
    ///
    /// `send_ping` is invoked on the party whenever the connection was
    /// idle for a whole interval. `on_done` receives `Ok(())` after
    /// [`stop`](Self::stop), or the error that ended the loop.
    pub fn spawn<S, D>(
        party: &Party,
        engine: EngineHandle,
        config: KeepaliveConfig,
        send_ping: S,
        on_done: D,
    ) -> Self
    where
        S: Fn() -> Result<(), KeepaliveError> + Send + Sync + 'static,
        D: FnOnce(Result<(), KeepaliveError>) + Send + 'static,
    {
        let manager = Self {
            received: Arc::new(AtomicU64::new(0)),
            data: Observable::new(0),
            stopped: Observable::new(false),
        };

        let data = manager.data.clone();
        let stopped = manager.stopped.clone();
        let send_ping = Arc::new(send_ping);

        party.spawn(
            "keepalive",
            move || {
                let timer = map(keepalive_loop(engine, data, config, send_ping), Err);
                let stop = map(stopped.next_when(|s| *s), |_| Ok(()));
                race(timer, stop)
            },
            move |result| {
                match &result {
                    Ok(()) => debug!("keepalive stopped"),
                    Err(err) => info!(error = %err, "keepalive failed"),
                }
                on_done(result);
            },
        );

        manager
    }

    /// Records that data arrived on the connection.
    pub fn got_data(&self) {
        let received = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        self.data.set(received);
    }

    /// Ends the keepalive loop, cancelling any pending timer.
    pub fn stop(&self) {
        self.stopped.set(true);
    }
}

fn keepalive_loop<S>(
    engine: EngineHandle,
    data: Observable<u64>,
    config: KeepaliveConfig,
    send_ping: Arc<S>,
) -> impl Promise<Output = KeepaliveError> + Send
where
    S: Fn() -> Result<(), KeepaliveError> + Send + Sync + 'static,
{
    loop_promise(move || {
        let seen = data.get();
        let (engine, data, send_ping) = (engine.clone(), data.clone(), send_ping.clone());

        seq(engine.sleep(config.interval), move |()| {
            let idle = data.get() == seen;

            if_then(
                idle,
                move || {
                    debug!("connection idle, sending ping");
                    let sent = send_ping();

                    map(await_data(engine, data, seen, config.timeout, sent), |result| {
                        match result {
                            Ok(()) => LoopCtl::Continue,
                            Err(err) => LoopCtl::Break(err),
                        }
                    })
                },
                || immediate(LoopCtl::Continue),
            )
        })
    })
}

/// Waits for any data after a ping went out, up to `timeout`.
fn await_data(
    engine: EngineHandle,
    data: Observable<u64>,
    seen: u64,
    timeout: Duration,
    sent: Result<(), KeepaliveError>,
) -> impl Promise<Output = Result<(), KeepaliveError>> + Send {
    try_seq(immediate(sent), move |()| {
        race(
            map(data.next(seen), |_| Ok(())),
            map(engine.sleep(timeout), |()| Err(KeepaliveError::Timeout)),
        )
    })
}
