//! Waits for whatever ends a supervised run: a stop signal, or the service
//! going away by itself.

use crate::controller::{Controller, StopOutcome};
use crate::signals::{SignalHandlers, StopSignal};
use crate::startable::{Service, Startable, StartableState};
use std::fmt::Debug;
use std::future::Future;
use tracing::{info, warn};

/// What ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    Signal(StopSignal),
    /// The service exited while still marked started.
    ServiceExited,
    /// Every signal source closed without a delivery.
    HandlersEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown {
    pub cause: ShutdownCause,
    /// `None` when no stop ran.
    pub outcome: Option<StopOutcome>,
}

/// Block until a signal handler has finished its stop, or until `exited`
/// resolves.
///
/// An exit seen while the core is still `Started` gets its own plain stop.
/// An exit seen in any other state was caused by a signal-triggered stop,
/// so this waits for that handler instead of stopping a second time.
pub async fn wait_for_shutdown<S, F>(
    controller: &Controller<Startable<S>>,
    handlers: &mut SignalHandlers,
    exited: F,
) -> Shutdown
where
    S: Service,
    F: Future,
    F::Output: Debug,
{
    tokio::select! {
        biased;
        handled = handlers.wait() => signal_shutdown(handled),
        status = exited => {
            if controller.core().state() != StartableState::Started {
                info!(exit = ?status, "service exited during signal-triggered stop");
                return signal_shutdown(handlers.wait().await);
            }
            info!(exit = ?status, "service exited on its own");
            Shutdown {
                cause: ShutdownCause::ServiceExited,
                outcome: Some(controller.stop(None).await),
            }
        }
    }
}

fn signal_shutdown(handled: Option<(StopSignal, StopOutcome)>) -> Shutdown {
    match handled {
        Some((signal, outcome)) => Shutdown {
            cause: ShutdownCause::Signal(signal),
            outcome: Some(outcome),
        },
        None => {
            warn!("signal handlers ended without a stop");
            Shutdown {
                cause: ShutdownCause::HandlersEnded,
                outcome: None,
            }
        }
    }
}
