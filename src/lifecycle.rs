/// The start/stop capability the controller drives, and the options a stop
/// request carries.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// Options passed through to a stop request.
///
/// `force` asks the service to skip draining. Any other fields are carried
/// along untouched so callers can hand service-specific hints to `on_stop`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopOptions {
    #[serde(default)]
    pub force: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StopOptions {
    /// Options for a forced stop with no extra fields.
    pub fn forced() -> Self {
        Self {
            force: true,
            extra: Map::new(),
        }
    }

    /// Attach a pass-through field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the given (possibly absent) options request a forced stop.
    pub fn is_forced(opts: Option<&StopOptions>) -> bool {
        opts.is_some_and(|o| o.force)
    }

    /// The forced form of `opts`: same pass-through fields, `force` set.
    pub fn escalate(opts: Option<&StopOptions>) -> StopOptions {
        let mut escalated = opts.cloned().unwrap_or_default();
        escalated.force = true;
        escalated
    }
}

/// Idempotent start/stop primitive wrapped by the controller.
///
/// Implementations guarantee that starting a started value and stopping a
/// stopped value are no-ops, and that concurrent calls collapse onto the
/// in-flight transition. [`crate::startable::Startable`] is the stock
/// implementation.
pub trait Lifecycle: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn start(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn stop(&self, opts: Option<StopOptions>)
        -> impl Future<Output = Result<(), Self::Error>> + Send;
}
