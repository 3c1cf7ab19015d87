//! Idempotent start/stop state machine around a [`Service`].
//!
//! ```text
//! Stopped --start--> Starting --ok--> Started --stop--> Stopping --ok--> Stopped
//!                       |                                   |
//!                       +--err/cancel--> Stopped            +--err/cancel--> Started
//! ```
//!
//! Transitions are serialized. A call that arrives while another transition
//! is in flight waits for it, then re-checks its guard, so a duplicate start
//! or stop collapses into a no-op.

use crate::lifecycle::{Lifecycle, StopOptions};
use std::future::Future;
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// The work a [`Startable`] performs on each transition.
pub trait Service: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn on_start(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn on_stop(&self, opts: Option<StopOptions>)
        -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartableState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

pub struct Startable<S> {
    service: S,
    state: watch::Sender<StartableState>,
    transition: Mutex<()>,
}

impl<S: Service> Startable<S> {
    pub fn new(service: S) -> Self {
        let (state, _) = watch::channel(StartableState::Stopped);
        Self {
            service,
            state,
            transition: Mutex::new(()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn state(&self) -> StartableState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<StartableState> {
        self.state.subscribe()
    }
}

impl<S: Service> Lifecycle for Startable<S> {
    type Error = S::Error;

    fn start(&self) -> impl Future<Output = Result<(), S::Error>> + Send {
        async move {
            let _transition = self.transition.lock().await;
            if self.state() == StartableState::Started {
                debug!("start requested while already started");
                return Ok(());
            }

            let step = Transition::begin(
                &self.state,
                StartableState::Starting,
                StartableState::Stopped,
            );
            self.service.on_start().await?;
            step.commit(StartableState::Started);
            Ok(())
        }
    }

    fn stop(
        &self,
        opts: Option<StopOptions>,
    ) -> impl Future<Output = Result<(), S::Error>> + Send {
        async move {
            let _transition = self.transition.lock().await;
            if self.state() == StartableState::Stopped {
                debug!("stop requested while already stopped");
                return Ok(());
            }

            let step = Transition::begin(
                &self.state,
                StartableState::Stopping,
                StartableState::Started,
            );
            self.service.on_stop(opts).await?;
            step.commit(StartableState::Stopped);
            Ok(())
        }
    }
}

/// An in-flight transition. Dropping it without `commit` (an error or a
/// cancelled future) restores the state it started from.
struct Transition<'a> {
    state: &'a watch::Sender<StartableState>,
    rollback: Option<StartableState>,
}

impl<'a> Transition<'a> {
    fn begin(
        state: &'a watch::Sender<StartableState>,
        during: StartableState,
        rollback: StartableState,
    ) -> Self {
        state.send_replace(during);
        Self {
            state,
            rollback: Some(rollback),
        }
    }

    fn commit(mut self, next: StartableState) {
        self.rollback = None;
        self.state.send_replace(next);
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.rollback.take() {
            debug!(state = ?previous, "transition abandoned, rolling back");
            self.state.send_replace(previous);
        }
    }
}
