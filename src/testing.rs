//! Fakes shared by the unit tests.

use crate::controller::FatalShutdown;
use crate::lifecycle::{Lifecycle, StopOptions};
use crate::signals::{SignalError, SignalListener, SignalSource, StopSignal};
use crate::startable::Service;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeError(pub String);

impl std::fmt::Display for FakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FakeError {}

/// How a single `on_stop` call behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    Succeed,
    Fail,
    /// Sleep, then succeed.
    Slow(Duration),
}

/// Scriptable [`Service`] that records every call.
#[derive(Debug)]
pub struct FakeService {
    starts: AtomicUsize,
    start_delay: Duration,
    start_error: Option<String>,
    stop_calls: Mutex<Vec<Option<StopOptions>>>,
    stop_script: Mutex<VecDeque<StopBehavior>>,
    stop_fallback: StopBehavior,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            starts: AtomicUsize::new(0),
            start_delay: Duration::ZERO,
            start_error: None,
            stop_calls: Mutex::new(Vec::new()),
            stop_script: Mutex::new(VecDeque::new()),
            stop_fallback: StopBehavior::Succeed,
        }
    }
}

impl FakeService {
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    /// Behaviors consumed one per `on_stop` call, before the fallback applies.
    pub fn with_stop_script(self, script: impl IntoIterator<Item = StopBehavior>) -> Self {
        self.stop_script.lock().unwrap().extend(script);
        self
    }

    /// Behavior once the script is exhausted.
    pub fn with_stop_fallback(mut self, behavior: StopBehavior) -> Self {
        self.stop_fallback = behavior;
        self
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> Vec<Option<StopOptions>> {
        self.stop_calls.lock().unwrap().clone()
    }
}

impl Service for FakeService {
    type Error = FakeError;

    fn on_start(&self) -> impl Future<Output = Result<(), FakeError>> + Send {
        async move {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if !self.start_delay.is_zero() {
                tokio::time::sleep(self.start_delay).await;
            }
            match &self.start_error {
                Some(message) => Err(FakeError(message.clone())),
                None => Ok(()),
            }
        }
    }

    fn on_stop(
        &self,
        opts: Option<StopOptions>,
    ) -> impl Future<Output = Result<(), FakeError>> + Send {
        async move {
            self.stop_calls.lock().unwrap().push(opts);
            let behavior = self
                .stop_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.stop_fallback);
            match behavior {
                StopBehavior::Succeed => Ok(()),
                StopBehavior::Fail => Err(FakeError("boom".to_string())),
                StopBehavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
            }
        }
    }
}

/// [`Lifecycle`] without idempotency: counts every stop it is asked for.
#[derive(Debug, Default)]
pub struct CountingCore {
    stops: AtomicUsize,
}

impl CountingCore {
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Lifecycle for CountingCore {
    type Error = FakeError;

    fn start(&self) -> impl Future<Output = Result<(), FakeError>> + Send {
        async { Ok(()) }
    }

    fn stop(
        &self,
        _opts: Option<StopOptions>,
    ) -> impl Future<Output = Result<(), FakeError>> + Send {
        async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

/// [`FatalShutdown`] that records exit codes instead of exiting.
#[derive(Debug, Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl FatalShutdown for RecordingExit {
    fn terminate(&self, code: i32) {
        self.codes.lock().unwrap().push(code);
    }
}

type Registry = Arc<Mutex<HashMap<StopSignal, mpsc::UnboundedSender<()>>>>;

/// In-process signal source. Deliveries with no registered handler are
/// recorded as falling through to the default action.
#[derive(Debug, Default, Clone)]
pub struct ManualSignals {
    registry: Registry,
    unhandled: Arc<Mutex<Vec<StopSignal>>>,
    fail_on: Option<StopSignal>,
}

impl ManualSignals {
    /// A source whose registration of `signal` fails.
    pub fn failing_on(signal: StopSignal) -> Self {
        Self {
            fail_on: Some(signal),
            ..Self::default()
        }
    }

    pub fn deliver(&self, signal: StopSignal) -> bool {
        let handled = match self.registry.lock().unwrap().get(&signal) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        };
        if !handled {
            self.unhandled.lock().unwrap().push(signal);
        }
        handled
    }

    pub fn registered(&self, signal: StopSignal) -> bool {
        self.registry.lock().unwrap().contains_key(&signal)
    }

    pub fn unhandled(&self) -> Vec<StopSignal> {
        self.unhandled.lock().unwrap().clone()
    }

    /// Drop every sender, so listeners see the source close.
    pub fn close_all(&self) {
        self.registry.lock().unwrap().clear();
    }
}

pub struct ManualListener {
    signal: StopSignal,
    rx: mpsc::UnboundedReceiver<()>,
    registry: Registry,
}

impl SignalSource for ManualSignals {
    type Listener = ManualListener;

    fn register(&self, signal: StopSignal) -> Result<ManualListener, SignalError> {
        if self.fail_on == Some(signal) {
            return Err(SignalError::Register {
                signal,
                source: std::io::Error::other("no driver"),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock().unwrap().insert(signal, tx);
        Ok(ManualListener {
            signal,
            rx,
            registry: Arc::clone(&self.registry),
        })
    }
}

impl SignalListener for ManualListener {
    fn recv(&mut self) -> impl Future<Output = Option<()>> + Send {
        self.rx.recv()
    }

    fn deregister(self) {
        self.registry.lock().unwrap().remove(&self.signal);
    }
}
