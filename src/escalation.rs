use crate::lifecycle::StopOptions;
use tracing::warn;

/// Which attempt of the stop protocol is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPhase {
    /// Plain stop: the caller did not ask for force.
    Graceful,
    /// Forced stop. `escalated` is true when the policy upgraded a failed
    /// graceful attempt, false when the caller asked for force up front.
    Forced { escalated: bool },
}

/// Decision returned by the escalation policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    /// Retry once more as a forced stop.
    Escalate,
    /// No attempts left: the process has to go.
    Terminate,
}

/// Two-phase escalation for a single `stop()` call.
///
/// A graceful attempt may be escalated to a forced one exactly once. A
/// forced attempt, whether requested or escalated, is the last one, so
/// every stop call makes at most two attempts.
#[derive(Debug)]
pub struct EscalationPolicy {
    phase: StopPhase,
}

impl EscalationPolicy {
    /// Start the policy in the phase the caller's options ask for.
    pub fn new(opts: Option<&StopOptions>) -> Self {
        let phase = if StopOptions::is_forced(opts) {
            StopPhase::Forced { escalated: false }
        } else {
            StopPhase::Graceful
        };
        Self { phase }
    }

    pub fn phase(&self) -> StopPhase {
        self.phase
    }

    /// True once a graceful attempt has been upgraded.
    pub fn is_escalated(&self) -> bool {
        matches!(self.phase, StopPhase::Forced { escalated: true })
    }

    /// Options to hand to the current attempt.
    ///
    /// The first attempt sees the caller's options verbatim (including
    /// `None`); an escalated attempt sees them with `force` set.
    pub fn attempt_options(&self, original: Option<&StopOptions>) -> Option<StopOptions> {
        if self.is_escalated() {
            Some(StopOptions::escalate(original))
        } else {
            original.cloned()
        }
    }

    /// Record a failed attempt and decide what happens next.
    pub fn on_failure(&mut self) -> EscalationDecision {
        match self.phase {
            StopPhase::Graceful => {
                self.phase = StopPhase::Forced { escalated: true };
                warn!("graceful stop failed, escalating to forced stop");
                EscalationDecision::Escalate
            }
            StopPhase::Forced { .. } => EscalationDecision::Terminate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_stop_starts_graceful() {
        let policy = EscalationPolicy::new(None);
        assert_eq!(policy.phase(), StopPhase::Graceful);
        assert!(!policy.is_escalated());

        let policy = EscalationPolicy::new(Some(&StopOptions::default()));
        assert_eq!(policy.phase(), StopPhase::Graceful);
    }

    #[test]
    fn test_forced_stop_starts_forced() {
        let policy = EscalationPolicy::new(Some(&StopOptions::forced()));
        assert_eq!(policy.phase(), StopPhase::Forced { escalated: false });
        assert!(!policy.is_escalated());
    }

    #[test]
    fn test_graceful_failure_escalates_once() {
        let mut policy = EscalationPolicy::new(None);
        assert_eq!(policy.on_failure(), EscalationDecision::Escalate);
        assert_eq!(policy.phase(), StopPhase::Forced { escalated: true });
        // Second failure: nothing left
        assert_eq!(policy.on_failure(), EscalationDecision::Terminate);
        assert_eq!(policy.on_failure(), EscalationDecision::Terminate);
    }

    #[test]
    fn test_requested_force_never_escalates() {
        let mut policy = EscalationPolicy::new(Some(&StopOptions::forced()));
        assert_eq!(policy.on_failure(), EscalationDecision::Terminate);
        assert!(!policy.is_escalated());
    }

    #[test]
    fn test_first_attempt_passes_options_verbatim() {
        let policy = EscalationPolicy::new(None);
        assert_eq!(policy.attempt_options(None), None);

        let opts = StopOptions::forced();
        let policy = EscalationPolicy::new(Some(&opts));
        assert_eq!(policy.attempt_options(Some(&opts)), Some(StopOptions::forced()));
    }

    #[test]
    fn test_escalated_attempt_forces_options() {
        let mut policy = EscalationPolicy::new(None);
        policy.on_failure();
        assert_eq!(policy.attempt_options(None), Some(StopOptions::forced()));

        let opts = StopOptions::default().with("reason", "sigterm");
        let mut policy = EscalationPolicy::new(Some(&opts));
        policy.on_failure();
        let attempt = policy.attempt_options(Some(&opts)).unwrap();
        assert!(attempt.force);
        assert_eq!(attempt.extra, opts.extra);
    }
}
