//! Retry controller: decide whether to loop back to extraction or stop.

use tracing::debug;

use crate::models::state::{Confidence, ProcessingState};

/// Default maximum number of extraction re-attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// What to do after a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A terminal error is set.
    Fail,
    /// The extraction was accepted.
    Accept,
    /// Re-run extraction with the verification reason.
    Retry,
    /// Low confidence and no budget left: emit the last attempt as is.
    GiveUp,
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Pure decision over `(confidence, retry_count, error)`.
    ///
    /// A missing label counts as low confidence.
    pub fn decide(&self, confidence: Option<Confidence>, retry_count: u32, error: Option<&str>) -> Decision {
        if error.is_some() {
            return Decision::Fail;
        }
        match confidence {
            Some(c) if c.is_accepted() => Decision::Accept,
            _ if retry_count < self.max_retries => Decision::Retry,
            _ => Decision::GiveUp,
        }
    }

    /// Decide for a state.
    pub fn decide_for(&self, state: &ProcessingState) -> Decision {
        self.decide(state.confidence, state.retry_count, state.error.as_deref())
    }

    /// Consume one unit of retry budget. The verification reason stays on
    /// the state so the next extraction can use it.
    pub fn begin_retry(&self, state: &mut ProcessingState) {
        state.retry_count += 1;
        debug!(
            document = state.document_reference(),
            retry = state.retry_count,
            max_retries = self.max_retries,
            "Confidence not high enough, retrying extraction with reason"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_wins_over_everything() {
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.decide(Some(Confidence::Verified), 0, Some("boom")), Decision::Fail);
        assert_eq!(policy.decide(Some(Confidence::Unsure), 0, Some("boom")), Decision::Fail);
        assert_eq!(policy.decide(None, 5, Some("boom")), Decision::Fail);
    }

    #[test]
    fn test_accepted_labels_terminate() {
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.decide(Some(Confidence::Verified), 0, None), Decision::Accept);
        assert_eq!(policy.decide(Some(Confidence::Certain), 2, None), Decision::Accept);
    }

    #[test]
    fn test_low_confidence_retries_until_budget_exhausted() {
        let policy = RetryPolicy::new(2);
        for label in [Confidence::Unsure, Confidence::False] {
            assert_eq!(policy.decide(Some(label), 0, None), Decision::Retry);
            assert_eq!(policy.decide(Some(label), 1, None), Decision::Retry);
            assert_eq!(policy.decide(Some(label), 2, None), Decision::GiveUp);
        }
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.decide(Some(Confidence::False), 0, None), Decision::GiveUp);
    }

    #[test]
    fn test_begin_retry_increments_once() {
        let policy = RetryPolicy::default();
        let mut state = ProcessingState::new("a.png");
        state.reason = Some("ambiguous date".into());

        policy.begin_retry(&mut state);

        assert_eq!(state.retry_count, 1);
        assert_eq!(state.reason.as_deref(), Some("ambiguous date"));
    }
}
