//! Transcript debouncer.
//!
//! Coalesces transcript segments into a single first-pass dispatch once the
//! speaker has been silent for the configured window.
//!
//! ## Design
//!
//! Uses an mpsc channel + timeout loop:
//! 1. `trigger()` sends a non-blocking message
//! 2. The background task waits for the first trigger, then keeps consuming
//!    triggers until `window` of silence (each trigger restarts the timer)
//! 3. After the quiet period it calls [`QuietHandler::on_quiet`]
//! 4. Cancelling the token (session teardown) drops any pending timer
//!    without firing

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Called once per burst of triggers, after the quiet period.
#[async_trait]
pub trait QuietHandler: Send + Sync {
    async fn on_quiet(&self);
}

pub struct TranscriptDebouncer {
    trigger_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl TranscriptDebouncer {
    /// Spawn the debounce loop. It lives until `cancel` fires or the
    /// debouncer is dropped.
    pub fn new(handler: Arc<dyn QuietHandler>, window: Duration, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel::<()>(64);
        tokio::spawn(Self::run_loop(handler, rx, window, cancel.clone()));
        Self {
            trigger_tx: tx,
            cancel,
        }
    }

    /// Restart the silence timer. Non-blocking; if the channel is full the
    /// trigger is dropped and the pending burst still fires.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Drop any pending timer and stop the loop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn run_loop(
        handler: Arc<dyn QuietHandler>,
        mut rx: mpsc::Receiver<()>,
        window: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            // Wait for the first trigger
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => {
                    if msg.is_none() {
                        break;
                    }
                }
            }

            let mut coalesced = 1usize;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(coalesced, "Debounce cancelled with pending segments");
                        return;
                    }
                    res = tokio::time::timeout(window, rx.recv()) => match res {
                        Ok(Some(())) => coalesced += 1,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
            }

            tracing::debug!(coalesced, "Transcript quiet period elapsed");
            handler.on_quiet().await;
        }
    }
}

impl Drop for TranscriptDebouncer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
