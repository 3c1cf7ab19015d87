/// Lifecycle controller: logs start, bounds stop in time, escalates a stalled
/// or failed stop to a forced one, and terminates the process when even the
/// forced stop cannot finish.
use crate::config::LifecycleConfig;
use crate::escalation::{EscalationDecision, EscalationPolicy};
use crate::lifecycle::{Lifecycle, StopOptions};
use crate::timer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Exit status used when the app cannot be stopped.
pub const SHUTDOWN_FAILED_EXIT_CODE: i32 = 1;

/// Ends the process when shutdown is unrecoverable.
///
/// Swappable so tests can observe the exit instead of dying.
pub trait FatalShutdown: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Exits the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl FatalShutdown for ProcessExit {
    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

/// How a `stop()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The requested stop succeeded within the timeout.
    Stopped,
    /// The graceful stop failed or stalled and the forced retry succeeded.
    ForceStopped,
    /// Nothing worked; the fatal shutdown capability was invoked.
    Terminated,
}

pub struct Controller<C> {
    core: C,
    stop_timeout: Duration,
    fatal: Arc<dyn FatalShutdown>,
}

impl<C: Lifecycle> Controller<C> {
    pub fn new(core: C, config: &LifecycleConfig) -> Self {
        Self {
            core,
            stop_timeout: config.stop_timeout(),
            fatal: Arc::new(ProcessExit),
        }
    }

    /// Replace the process-exit behavior.
    pub fn with_fatal_shutdown(mut self, fatal: Arc<dyn FatalShutdown>) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Start the wrapped core. Errors come back unchanged; what to do about
    /// them is the caller's call.
    pub async fn start(&self) -> Result<(), C::Error> {
        info!("starting app...");
        match self.core.start().await {
            Ok(()) => {
                info!("app started");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "error starting app");
                Err(err)
            }
        }
    }

    /// Stop the wrapped core within the configured timeout.
    ///
    /// A graceful stop that fails or runs out of time is retried once as a
    /// forced stop under a fresh timeout, so the whole call takes at most two
    /// timeouts. If the forced attempt also fails, or the caller asked for
    /// force and that failed, the fatal shutdown capability is invoked with
    /// [`SHUTDOWN_FAILED_EXIT_CODE`].
    pub async fn stop(&self, opts: Option<StopOptions>) -> StopOutcome {
        info!(opts = ?opts, "stopping app...");
        let mut policy = EscalationPolicy::new(opts.as_ref());

        loop {
            let attempt = policy.attempt_options(opts.as_ref());
            let err = match timer::race(self.stop_timeout, self.core.stop(attempt)).await {
                Ok(()) => {
                    info!(opts = ?opts, phase = ?policy.phase(), "app stopped");
                    return if policy.is_escalated() {
                        StopOutcome::ForceStopped
                    } else {
                        StopOutcome::Stopped
                    };
                }
                Err(err) => err,
            };

            if !policy.is_escalated() {
                error!(opts = ?opts, error = %err, "error stopping app");
            }

            match policy.on_failure() {
                EscalationDecision::Escalate => continue,
                EscalationDecision::Terminate => {
                    error!(opts = ?opts, error = %err, "error force stopping app");
                    self.fatal.terminate(SHUTDOWN_FAILED_EXIT_CODE);
                    return StopOutcome::Terminated;
                }
            }
        }
    }
}
