//! Signal-driven shutdown sequencing.
//!
//! Handlers are installed only for the no-output-path mode; with a fixed
//! destination the run goes to natural completion instead. The first signal
//! latches a trigger and wakes the session dispatcher, which performs the
//! ordered teardown; any further signal hits the latched trigger and is a
//! no-op rather than a second teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
#[cfg(unix)]
use tracing::warn;

/// Handle for requesting shutdown: used by the signal listeners, and by
/// front-ends or tests that shut down programmatically.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Only the first call does anything; returns whether
    /// this call was the one that fired.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.try_send(());
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// The dispatcher's side of the shutdown channel.
pub struct ShutdownSequencer {
    rx: Option<mpsc::Receiver<()>>,
    // Keeps the channel open so `requested` pends after the first delivery
    // instead of seeing a closed channel.
    _trigger: Option<ShutdownTrigger>,
}

impl ShutdownSequencer {
    /// A sequencer that never fires (fixed output destination mode).
    pub fn disabled() -> Self {
        Self {
            rx: None,
            _trigger: None,
        }
    }

    /// Manual sequencer plus its trigger.
    pub fn manual() -> (Self, ShutdownTrigger) {
        let (tx, rx) = mpsc::channel(1);
        let trigger = ShutdownTrigger {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        };
        (
            Self {
                rx: Some(rx),
                _trigger: Some(trigger.clone()),
            },
            trigger,
        )
    }

    /// Install SIGINT/SIGTERM listeners. The OS-level handlers stay
    /// registered for the life of the process, so a second signal reaches
    /// the latched trigger instead of the default kill disposition.
    pub fn install() -> Self {
        let (sequencer, trigger) = Self::manual();
        tokio::spawn(listen(trigger));
        sequencer
    }

    /// Install handlers only when no output path is configured.
    pub fn for_output_mode(out_configured: bool) -> Self {
        if out_configured {
            Self::disabled()
        } else {
            Self::install()
        }
    }

    /// Resolves on the first shutdown request; pends forever otherwise.
    pub async fn requested(&mut self) {
        match &mut self.rx {
            Some(rx) => {
                let _ = rx.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(unix)]
async fn listen(trigger: ShutdownTrigger) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "could not install SIGINT handler");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "could not install SIGTERM handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        trigger.fire();
    }
}

#[cfg(not(unix))]
async fn listen(trigger: ShutdownTrigger) {
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        trigger.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_fire_is_noop() {
        let (_sequencer, trigger) = ShutdownSequencer::manual();
        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(trigger.is_fired());
    }

    #[tokio::test]
    async fn test_requested_resolves_after_fire() {
        let (mut sequencer, trigger) = ShutdownSequencer::manual();
        trigger.fire();
        trigger.fire();
        // Two rapid signals deliver exactly one request.
        sequencer.requested().await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            sequencer.requested(),
        )
        .await;
        assert!(second.is_err(), "second teardown request must never arrive");
    }

    #[test]
    fn test_disabled_sequencer_pends() {
        let mut sequencer = ShutdownSequencer::disabled();
        let mut requested = tokio_test::task::spawn(sequencer.requested());
        assert!(requested.poll().is_pending());
    }
}
