/// Supervised command: the service stopguard runs under its controller.
///
/// Start spawns the configured command in its own process group. A graceful
/// stop sends SIGTERM to the group, a forced stop sends SIGKILL; either way
/// the stop resolves once the command has exited.
use crate::config::ServiceConfig;
use crate::lifecycle::StopOptions;
use crate::startable::Service;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tokio::sync::watch;

/// How the supervised command exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
}

/// Errors that can occur while driving the supervised command.
#[derive(Debug)]
pub enum ServiceError {
    /// Failed to spawn the command.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// Failed to signal the command's process group.
    Signal {
        pid: i32,
        signal: Signal,
        source: Errno,
    },
    /// The command was spawned but reported no pid to signal.
    NoPid { command: String },
    /// The task reaping the command went away before reporting an exit.
    Lost { pid: i32 },
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Spawn { command, source } => {
                write!(f, "failed to spawn {}: {}", command, source)
            }
            ServiceError::Signal {
                pid,
                signal,
                source,
            } => {
                write!(
                    f,
                    "failed to send {} to process group {}: {}",
                    signal.as_str(),
                    pid,
                    source
                )
            }
            ServiceError::NoPid { command } => {
                write!(f, "spawned {} but it reported no pid", command)
            }
            ServiceError::Lost { pid } => {
                write!(f, "lost track of supervised process {}", pid)
            }
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Spawn { source, .. } => Some(source),
            ServiceError::Signal { source, .. } => Some(source),
            ServiceError::NoPid { .. } | ServiceError::Lost { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct RunningChild {
    pid: Pid,
    exit: watch::Receiver<Option<ChildExit>>,
}

#[derive(Debug)]
pub struct ChildService {
    config: ServiceConfig,
    running: Mutex<Option<RunningChild>>,
}

impl ChildService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
        }
    }

    /// PID of the running command, if any.
    pub fn pid(&self) -> Option<i32> {
        self.running_child().map(|c| c.pid.as_raw())
    }

    /// Watch the running command's exit status. `None` when nothing runs.
    pub fn exit_receiver(&self) -> Option<watch::Receiver<Option<ChildExit>>> {
        self.running_child().map(|c| c.exit)
    }

    fn running_child(&self) -> Option<RunningChild> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_running(&self, child: Option<RunningChild>) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = child;
    }
}

impl Service for ChildService {
    type Error = ServiceError;

    fn on_start(&self) -> impl Future<Output = Result<(), ServiceError>> + Send {
        async move {
            tracing::info!(
                command = %self.config.command,
                args = ?self.config.args,
                "spawning supervised command"
            );

            let mut child = Command::new(&self.config.command)
                .args(&self.config.args)
                .process_group(0) // New process group so stop reaches every descendant
                .spawn()
                .map_err(|e| ServiceError::Spawn {
                    command: self.config.command.clone(),
                    source: e,
                })?;

            // A pid of 0 would make killpg hit our own group
            let pid = child.id().ok_or_else(|| ServiceError::NoPid {
                command: self.config.command.clone(),
            })? as i32;
            let (tx, rx) = watch::channel(None);
            tokio::spawn(async move {
                let exit = match child.wait().await {
                    Ok(status) => ChildExit {
                        code: status.code(),
                    },
                    Err(e) => {
                        tracing::warn!(pid, error = %e, "failed to wait on supervised command");
                        ChildExit { code: None }
                    }
                };
                tracing::info!(pid, exit_code = ?exit.code, "supervised command exited");
                tx.send_replace(Some(exit));
            });

            self.set_running(Some(RunningChild {
                pid: Pid::from_raw(pid),
                exit: rx,
            }));
            tracing::info!(pid, "supervised command started");
            Ok(())
        }
    }

    fn on_stop(
        &self,
        opts: Option<StopOptions>,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send {
        async move {
            let Some(RunningChild { pid, mut exit }) = self.running_child() else {
                return Ok(());
            };

            let already_exited = exit.borrow().is_some();
            if !already_exited {
                let signal = if StopOptions::is_forced(opts.as_ref()) {
                    Signal::SIGKILL
                } else {
                    Signal::SIGTERM
                };
                tracing::info!(
                    pid = pid.as_raw(),
                    signal = signal.as_str(),
                    "signalling supervised command"
                );
                match killpg(pid, signal) {
                    // ESRCH: the group is already gone, the reaper will report it
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(source) => {
                        return Err(ServiceError::Signal {
                            pid: pid.as_raw(),
                            signal,
                            source,
                        })
                    }
                }
            }

            let exited = exit
                .wait_for(Option::is_some)
                .await
                .map(|status| *status)
                .map_err(|_| ServiceError::Lost { pid: pid.as_raw() })?;
            tracing::debug!(pid = pid.as_raw(), exit = ?exited, "supervised command reaped");
            self.set_running(None);
            Ok(())
        }
    }
}
