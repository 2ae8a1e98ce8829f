//! Deletion confirmation state machine.
//!
//! A destructive tool never runs on the LLM's say-so alone. The first delete
//! request for a target parks it as pending and returns an
//! `awaiting_confirmation` payload; only an explicit affirmative signal from
//! the user moves it to confirmed, and only a confirmed target may be
//! deleted. Rejection, any unrelated tool call, or a timeout cancels.
//!
//! The state itself lives on the [`Session`](super::session::Session); this
//! module holds the transition rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::AgentError;

// ─── Constants ──────────────────────────────────────────────────────────────

/// How long a pending or confirmed deletion stays valid.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;

/// Upper clamp for configured timeouts (one year).
const MAX_CONFIRMATION_TIMEOUT_SECS: u64 = 365 * 24 * 3600;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Per-session confirmation slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationState {
    #[default]
    Idle,
    Pending {
        target: String,
        requested_at: DateTime<Utc>,
    },
    Confirmed {
        target: String,
        confirmed_at: DateTime<Utc>,
    },
}

impl ConfirmationState {
    /// The target awaiting the user's answer, if any.
    pub fn pending_target(&self) -> Option<&str> {
        match self {
            ConfirmationState::Pending { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConfirmationState::Idle)
    }

    fn target(&self) -> Option<&str> {
        match self {
            ConfirmationState::Idle => None,
            ConfirmationState::Pending { target, .. }
            | ConfirmationState::Confirmed { target, .. } => Some(target),
        }
    }
}

/// Explicit answer from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Affirm,
    Reject,
}

/// Why a pending or confirmed deletion was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Rejected,
    UnrelatedCall,
    Expired,
    Superseded,
}

/// Result of applying a user signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Affirmed { target: String },
    Cancelled { target: String, reason: CancelReason },
    /// Nothing was pending and the signal was a rejection.
    NoOp,
}

/// What the dispatcher should do with a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteDecision {
    /// Do not run the handler; tell the LLM to ask the user.
    AwaitConfirmation {
        target: String,
        superseded: Option<String>,
    },
    /// The target was confirmed; run the handler, then call `complete`.
    Execute { target: String },
}

// ─── ConfirmationPolicy ─────────────────────────────────────────────────────

/// Transition rules with a configurable timeout.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
    }
}

impl ConfirmationPolicy {
    pub fn new(timeout_secs: u64) -> Self {
        let secs = timeout_secs.min(MAX_CONFIRMATION_TIMEOUT_SECS) as i64;
        Self {
            timeout: Duration::seconds(secs),
        }
    }

    /// Drop a pending or confirmed target older than the timeout.
    /// Returns the cancelled target.
    pub fn expire(&self, state: &mut ConfirmationState, now: DateTime<Utc>) -> Option<String> {
        let since = match state {
            ConfirmationState::Idle => return None,
            ConfirmationState::Pending { requested_at, .. } => *requested_at,
            ConfirmationState::Confirmed { confirmed_at, .. } => *confirmed_at,
        };
        if now - since <= self.timeout {
            return None;
        }
        let target = state.target().map(str::to_string);
        tracing::info!(deletion_target = ?target, "deletion confirmation expired");
        *state = ConfirmationState::Idle;
        target
    }

    /// Gate a delete request for `target`.
    ///
    /// Without the confirm flag the target becomes pending (replacing any
    /// other). With the flag the target must already be confirmed.
    pub fn on_delete(
        &self,
        state: &mut ConfirmationState,
        target: &str,
        confirm: bool,
        now: DateTime<Utc>,
    ) -> Result<DeleteDecision, AgentError> {
        self.expire(state, now);

        if confirm {
            return match state {
                ConfirmationState::Confirmed { target: t, .. } if t == target => {
                    Ok(DeleteDecision::Execute {
                        target: target.to_string(),
                    })
                }
                _ => Err(AgentError::ConfirmationRequired {
                    target: target.to_string(),
                }),
            };
        }

        let superseded = state
            .target()
            .filter(|t| *t != target)
            .map(str::to_string);
        if let Some(ref old) = superseded {
            tracing::info!(old = %old, new = %target, "pending deletion superseded");
        }
        *state = ConfirmationState::Pending {
            target: target.to_string(),
            requested_at: now,
        };
        tracing::info!(deletion_target = %target, "deletion awaiting confirmation");
        Ok(DeleteDecision::AwaitConfirmation {
            target: target.to_string(),
            superseded,
        })
    }

    /// Apply the user's explicit answer.
    pub fn on_signal(
        &self,
        state: &mut ConfirmationState,
        signal: Signal,
        now: DateTime<Utc>,
    ) -> Result<SignalOutcome, AgentError> {
        if let Some(target) = self.expire(state, now) {
            return match signal {
                Signal::Affirm => Err(AgentError::precondition(format!(
                    "confirmation for deleting '{target}' expired; ask again"
                ))),
                Signal::Reject => Ok(SignalOutcome::Cancelled {
                    target,
                    reason: CancelReason::Expired,
                }),
            };
        }

        match (signal, state.clone()) {
            (Signal::Affirm, ConfirmationState::Pending { target, .. }) => {
                *state = ConfirmationState::Confirmed {
                    target: target.clone(),
                    confirmed_at: now,
                };
                tracing::info!(deletion_target = %target, "deletion confirmed by user");
                Ok(SignalOutcome::Affirmed { target })
            }
            (Signal::Affirm, ConfirmationState::Confirmed { target, .. }) => {
                Ok(SignalOutcome::Affirmed { target })
            }
            (Signal::Affirm, ConfirmationState::Idle) => Err(AgentError::precondition(
                "no deletion is awaiting confirmation",
            )),
            (Signal::Reject, ConfirmationState::Idle) => Ok(SignalOutcome::NoOp),
            (Signal::Reject, ConfirmationState::Pending { target, .. })
            | (Signal::Reject, ConfirmationState::Confirmed { target, .. }) => {
                *state = ConfirmationState::Idle;
                tracing::info!(deletion_target = %target, "deletion rejected by user");
                Ok(SignalOutcome::Cancelled {
                    target,
                    reason: CancelReason::Rejected,
                })
            }
        }
    }

    /// Any other tool call abandons a pending or confirmed deletion.
    pub fn on_unrelated_call(&self, state: &mut ConfirmationState) -> Option<String> {
        let target = state.target().map(str::to_string)?;
        *state = ConfirmationState::Idle;
        tracing::info!(deletion_target = %target, "pending deletion cancelled by unrelated tool call");
        Some(target)
    }

    /// Return to idle once the delete handler has run.
    pub fn complete(&self, state: &mut ConfirmationState) {
        *state = ConfirmationState::Idle;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
