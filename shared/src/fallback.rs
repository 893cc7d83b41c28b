//! Ordered "first success wins" attempts.
//!
//! Alert channels and text-service endpoints share this shape: try each
//! candidate once, in priority order, stop at the first success, and keep
//! every failure for reporting.

use std::future::Future;

#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt<C, E> {
    pub candidate: C,
    pub error: E,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackOutcome<C, T, E> {
    Succeeded {
        candidate: C,
        value: T,
        failures: Vec<FailedAttempt<C, E>>,
    },
    Exhausted {
        failures: Vec<FailedAttempt<C, E>>,
    },
}

impl<C, T, E> FallbackOutcome<C, T, E> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, FallbackOutcome::Succeeded { .. })
    }

    #[must_use]
    pub fn failures(&self) -> &[FailedAttempt<C, E>] {
        match self {
            FallbackOutcome::Succeeded { failures, .. } | FallbackOutcome::Exhausted { failures } => {
                failures
            }
        }
    }

    pub fn into_result(self) -> Result<T, Vec<FailedAttempt<C, E>>> {
        match self {
            FallbackOutcome::Succeeded { value, .. } => Ok(value),
            FallbackOutcome::Exhausted { failures } => Err(failures),
        }
    }
}

/// Runs `attempt` for each candidate in order until one succeeds. Each
/// candidate is tried at most once and later candidates are never started
/// after a success.
pub async fn first_success<C, T, E, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: F,
) -> FallbackOutcome<C, T, E>
where
    C: Clone,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => {
                return FallbackOutcome::Succeeded {
                    candidate,
                    value,
                    failures,
                }
            }
            Err(error) => failures.push(FailedAttempt { candidate, error }),
        }
    }
    FallbackOutcome::Exhausted { failures }
}
