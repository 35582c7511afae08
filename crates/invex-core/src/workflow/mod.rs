//! Extraction workflow: an explicit state machine over a fixed topology.
//!
//! ```text
//! OcrDone ──▶ Extracted ──▶ VerifiedTerminal
//!                │  ▲
//!                ▼  │
//!             Retrying
//!
//! any stage with an error set ──▶ Failed
//! ```

mod pipeline;

pub use pipeline::Pipeline;

use crate::extraction::{Decision, RetryPolicy};
use crate::models::state::ProcessingState;

/// Workflow stage of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// OCR text is available; the first extraction is next.
    OcrDone,
    /// An extraction attempt finished; verification is next.
    Extracted,
    /// A confidence label is final (accepted, or retry budget exhausted).
    VerifiedTerminal,
    /// Low confidence with budget left; another extraction is next.
    Retrying,
    /// A terminal error is set.
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::VerifiedTerminal | Self::Failed)
    }
}

/// Pure transition function.
///
/// `current` is the stage whose work has just been applied to `state`:
/// from `OcrDone` / `Retrying` an extraction ran, from `Extracted` a
/// verification ran. Terminal stages map to themselves.
pub fn next_stage(current: Stage, state: &ProcessingState, policy: &RetryPolicy) -> Stage {
    if current.is_terminal() {
        return current;
    }
    if state.is_failed() {
        return Stage::Failed;
    }
    match current {
        Stage::OcrDone | Stage::Retrying => Stage::Extracted,
        Stage::Extracted => match policy.decide_for(state) {
            Decision::Accept | Decision::GiveUp => Stage::VerifiedTerminal,
            Decision::Retry => Stage::Retrying,
            Decision::Fail => Stage::Failed,
        },
        Stage::VerifiedTerminal | Stage::Failed => current,
    }
}
