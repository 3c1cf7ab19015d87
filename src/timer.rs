/// Cancellable stop timer and the timeout race built on it.
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Sleep;

/// A stop attempt outlived its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeout {
    elapsed: Duration,
}

impl StopTimeout {
    pub fn new(elapsed: Duration) -> Self {
        Self { elapsed }
    }

    /// How long the attempt ran before the timer fired.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl std::fmt::Display for StopTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "app stop timed out after {}ms", self.elapsed.as_millis())
    }
}

impl std::error::Error for StopTimeout {}

/// Why a bounded stop attempt did not succeed.
#[derive(Debug)]
pub enum StopError<E> {
    /// The timer fired before the stop settled.
    TimedOut(StopTimeout),
    /// The stop itself failed.
    Failed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for StopError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopError::TimedOut(timeout) => write!(f, "{timeout}"),
            StopError::Failed(e) => write!(f, "stop failed: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for StopError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StopError::TimedOut(timeout) => Some(timeout),
            StopError::Failed(e) => Some(e),
        }
    }
}

/// One-shot timer guarding a stop attempt.
///
/// Once cancelled the timer is gone, so it can never report completion.
/// A timer whose deadline has passed counts as fired and can no longer be
/// cancelled.
pub struct StopTimer {
    sleep: Pin<Box<Sleep>>,
    duration: Duration,
}

impl StopTimer {
    /// Arm a timer that fires after `duration`.
    pub fn start(duration: Duration) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(duration)),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_fired(&self) -> bool {
        self.sleep.is_elapsed()
    }

    /// Resolve once the deadline passes.
    pub async fn fired(&mut self) -> StopTimeout {
        self.sleep.as_mut().await;
        StopTimeout::new(self.duration)
    }

    /// Disarm the timer. Returns `false` if it had already fired.
    pub fn cancel(self) -> bool {
        !self.is_fired()
    }
}

enum Settled<T> {
    Operation(T),
    Timer(StopTimeout),
}

/// Race `operation` against a fresh [`StopTimer`] of `duration`.
///
/// Both are armed before either is polled and neither side is preferred.
/// The timer is cancelled as soon as the operation settles; if the timer
/// wins, the operation future is dropped.
pub async fn race<F, T, E>(duration: Duration, operation: F) -> Result<T, StopError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    let mut timer = StopTimer::start(duration);
    let settled = tokio::select! {
        result = operation => Settled::Operation(result),
        timeout = timer.fired() => Settled::Timer(timeout),
    };

    match settled {
        Settled::Operation(result) => {
            let cancelled = timer.cancel();
            tracing::trace!(cancelled, "stop timer cleared");
            result.map_err(StopError::Failed)
        }
        Settled::Timer(timeout) => {
            tracing::debug!(timeout_ms = duration.as_millis() as u64, "stop timer fired");
            Err(StopError::TimedOut(timeout))
        }
    }
}
