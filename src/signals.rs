/// Signal-triggered shutdown.
///
/// Handles SIGINT (Ctrl-C) and SIGTERM. Each signal gets one handler task.
/// On first delivery the handler deregisters itself, so a repeat of the same
/// signal falls through to the default OS action, then runs a plain
/// (non-forced) stop through the controller. The two signals are independent.
use crate::controller::{Controller, StopOutcome};
use crate::lifecycle::Lifecycle;
use nix::sys::signal::{self as nix_signal, SigHandler, Signal};
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{self as unix_signal, SignalKind};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Signals that trigger a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl StopSignal {
    pub const ALL: [StopSignal; 2] = [StopSignal::Interrupt, StopSignal::Terminate];

    pub fn name(self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
        }
    }

    fn kind(self) -> SignalKind {
        match self {
            StopSignal::Interrupt => SignalKind::interrupt(),
            StopSignal::Terminate => SignalKind::terminate(),
        }
    }

    fn as_nix(self) -> Signal {
        match self {
            StopSignal::Interrupt => Signal::SIGINT,
            StopSignal::Terminate => Signal::SIGTERM,
        }
    }
}

/// Errors that can occur while registering signal handlers.
#[derive(Debug)]
pub enum SignalError {
    Register {
        signal: StopSignal,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::Register { signal, source } => {
                write!(f, "failed to register {} handler: {}", signal.name(), source)
            }
        }
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignalError::Register { source, .. } => Some(source),
        }
    }
}

/// Where signal deliveries come from.
pub trait SignalSource {
    type Listener: SignalListener;

    fn register(&self, signal: StopSignal) -> Result<Self::Listener, SignalError>;
}

/// A registered handler for one signal.
pub trait SignalListener: Send + 'static {
    /// Wait for the next delivery. `None` means no more deliveries will come.
    fn recv(&mut self) -> impl Future<Output = Option<()>> + Send;

    /// Remove the handler; later deliveries get the default disposition.
    fn deregister(self);
}

/// Process signals via tokio's signal driver.
///
/// Registration is one-shot per process. Deregistering resets the OS
/// disposition to `SIG_DFL` underneath tokio, and tokio never reinstalls its
/// handler for a signal it has already hooked. A later `install(.., &OsSignals)`
/// in the same process therefore gets no delivery for that signal: the
/// default action runs and the process dies.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignals;

pub struct OsListener {
    signal: StopSignal,
    inner: unix_signal::Signal,
}

impl SignalSource for OsSignals {
    type Listener = OsListener;

    fn register(&self, signal: StopSignal) -> Result<OsListener, SignalError> {
        let inner = unix_signal::signal(signal.kind())
            .map_err(|source| SignalError::Register { signal, source })?;
        Ok(OsListener { signal, inner })
    }
}

impl SignalListener for OsListener {
    fn recv(&mut self) -> impl Future<Output = Option<()>> + Send {
        self.inner.recv()
    }

    /// Restore `SIG_DFL` for this signal. See [`OsSignals`] for why this
    /// cannot be undone by registering again.
    fn deregister(self) {
        // SAFETY: SIG_DFL installs no handler code, so nothing can run in
        // signal context on our behalf afterwards.
        let restored = unsafe { nix_signal::signal(self.signal.as_nix(), SigHandler::SigDfl) };
        if let Err(errno) = restored {
            warn!(
                signal = self.signal.name(),
                error = %errno,
                "failed to restore default signal disposition"
            );
        }
    }
}

/// Handler tasks for the stop signals. Dropping this aborts any handler that
/// is still waiting.
pub struct SignalHandlers {
    tasks: JoinSet<(StopSignal, Option<StopOutcome>)>,
}

impl SignalHandlers {
    /// Handlers still registered or still running their stop.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the first signal-triggered stop to finish.
    ///
    /// Returns `None` once every handler has ended without a delivery.
    pub async fn wait(&mut self) -> Option<(StopSignal, StopOutcome)> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((signal, Some(outcome))) => return Some((signal, outcome)),
                Ok((signal, None)) => {
                    debug!(signal = signal.name(), "signal source closed");
                }
                Err(e) if e.is_panic() => {
                    error!(error = %e, "signal handler panicked");
                }
                Err(_) => {}
            }
        }
        None
    }
}

/// Register a stop handler for every [`StopSignal`].
///
/// If any registration fails, handlers already installed are aborted.
pub fn install<C, S>(
    controller: &Arc<Controller<C>>,
    source: &S,
) -> Result<SignalHandlers, SignalError>
where
    C: Lifecycle,
    S: SignalSource,
{
    let mut handlers = SignalHandlers {
        tasks: JoinSet::new(),
    };
    for signal in StopSignal::ALL {
        let listener = source.register(signal)?;
        handlers
            .tasks
            .spawn(handle_signal(Arc::clone(controller), signal, listener));
    }
    debug!(count = handlers.pending(), "stop signal handlers installed");
    Ok(handlers)
}

async fn handle_signal<C, L>(
    controller: Arc<Controller<C>>,
    signal: StopSignal,
    mut listener: L,
) -> (StopSignal, Option<StopOutcome>)
where
    C: Lifecycle,
    L: SignalListener,
{
    if listener.recv().await.is_none() {
        return (signal, None);
    }
    listener.deregister();

    info!(signal = signal.name(), "app received stop signal");
    let outcome = controller.stop(None).await;
    (signal, Some(outcome))
}
