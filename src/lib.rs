//! Bounded-time shutdown for long-running processes.
//!
//! A [`Controller`] wraps anything implementing [`Lifecycle`] and layers on
//! top of it: logged start, a stop raced against a timeout, one automatic
//! escalation from graceful to forced stop, and process exit when even the
//! forced stop cannot finish. [`signals::install`] wires SIGINT and SIGTERM
//! to a single graceful stop each.

pub mod config;
pub mod controller;
pub mod escalation;
pub mod lifecycle;
pub mod service;
pub mod signals;
pub mod startable;
pub mod supervisor;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{LifecycleConfig, StopguardConfig};
pub use controller::{
    Controller, FatalShutdown, ProcessExit, StopOutcome, SHUTDOWN_FAILED_EXIT_CODE,
};
pub use lifecycle::{Lifecycle, StopOptions};
pub use startable::{Service, Startable, StartableState};
pub use timer::{StopError, StopTimeout};
