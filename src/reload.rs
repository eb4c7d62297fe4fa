//! Reload Controller
//!
//! `SIGHUP` forces a schema refresh. The signal task only enqueues a request;
//! the refresh itself runs on the connector's scheduler loop, followed by the
//! hook of whatever layer handled the reload before us.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::schema::{RefreshOutcome, SchemaCache};

/// Handler chained after each forced refresh.
pub type ReloadHook = Box<dyn FnMut() + Send>;

/// Create a reload trigger and the matching request stream.
///
/// The queue holds one request: triggers fired while one is pending are
/// coalesced into it.
pub fn reload_channel() -> (ReloadTrigger, ReloadRequests) {
    let (tx, rx) = mpsc::channel(1);
    (ReloadTrigger { tx }, ReloadRequests { rx })
}

/// Sending side of the reload queue.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::Sender<()>,
}

impl ReloadTrigger {
    /// Request a reload. Returns `false` if it was coalesced or nobody listens.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                tracing::debug!("Reload already pending");
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Receiving side of the reload queue, polled by the connector.
#[derive(Debug)]
pub struct ReloadRequests {
    rx: mpsc::Receiver<()>,
}

impl ReloadRequests {
    /// Wait for the next request; `None` once every trigger is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Spawn a task turning `SIGHUP` into reload requests.
#[cfg(unix)]
pub fn listen_for_hangup(trigger: ReloadTrigger) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("Received SIGHUP, reloading configuration");
            trigger.trigger();
        }
    }))
}

/// Runs forced refreshes and chains to the previous reload handler.
pub struct ReloadController {
    previous: Option<ReloadHook>,
    reloads: u64,
}

impl ReloadController {
    pub fn new(previous: Option<ReloadHook>) -> Self {
        Self {
            previous,
            reloads: 0,
        }
    }

    /// Handle one reload request.
    pub async fn handle(&mut self, cache: &mut SchemaCache) -> RefreshOutcome {
        let outcome = cache.force_refresh().await;
        self.reloads += 1;
        tracing::debug!(?outcome, reloads = self.reloads, "Reload handled");

        if let Some(previous) = self.previous.as_mut() {
            previous();
        }
        outcome
    }

    /// Reload requests handled so far.
    pub fn reloads(&self) -> u64 {
        self.reloads
    }
}
