//! Session keeper
//!
//! A background task that sends a keep-alive RPC on a fixed period so the
//! device does not drop an idle session. It exits when cancelled or when the
//! transport reports the connection dead; other failures are logged and the
//! next tick tries again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::session::SharedSession;

/// RPC body sent on every tick
pub const KEEPALIVE_RPC: &str = "<keep-alive/>";

/// Default tick period; must stay below the device's idle timeout
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(18);

/// Handle to a running keep-alive task
#[derive(Debug)]
pub struct SessionKeeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionKeeper {
    /// Spawn the keep-alive loop on the current tokio runtime
    pub fn start(session: SharedSession, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(session, period, cancel.clone()));
        debug!(period_ms = period.as_millis() as u64, "keep-alive started");
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Whether the loop is still ticking
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit. No tick fires after this
    /// returns. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "keep-alive task ended abnormally");
            }
        }
    }
}

impl Drop for SessionKeeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(session: SharedSession, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("keep-alive cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        match session.execute(KEEPALIVE_RPC).await {
            Ok(_) => trace!("keep-alive sent"),
            Err(e) if e.is_dead() => {
                debug!(error = %e, "connection is dead, keep-alive stopping");
                return;
            }
            Err(e) => debug!(error = %e, "keep-alive failed"),
        }
    }
}
