use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::StudioError;

/// How per-attempt outcomes of a fan-out combine into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Succeeds if any attempt succeeded; otherwise fails with the last settled error.
    AnyOfN,
    /// Always succeeds with whatever attempts produced, possibly nothing.
    BestEffort,
}

/// Drives every attempt to completion on the current task and aggregates.
///
/// Attempts are interleaved cooperatively, none is cancelled, and successes
/// are returned in completion order.
pub async fn fan_out<T, Fut, I>(attempts: I, aggregation: Aggregation) -> Result<Vec<T>, StudioError>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, StudioError>>,
{
    let mut pending: FuturesUnordered<Fut> = attempts.into_iter().collect();
    let total = pending.len();
    let mut successes = Vec::with_capacity(total);
    let mut last_failure = None;

    while let Some(outcome) = pending.next().await {
        match outcome {
            Ok(value) => successes.push(value),
            Err(err) => {
                tracing::warn!(kind = err.kind().as_str(), error = %err, "fan-out attempt failed");
                last_failure = Some(err);
            }
        }
    }
    tracing::debug!(total, succeeded = successes.len(), ?aggregation, "fan-out settled");

    match aggregation {
        Aggregation::BestEffort => Ok(successes),
        Aggregation::AnyOfN if !successes.is_empty() => Ok(successes),
        Aggregation::AnyOfN => Err(last_failure.unwrap_or(StudioError::NoImageData)),
    }
}
