//! Running a trim off the async runtime's worker threads.

use super::{TrimReport, TrimRequest, Trimmer};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Run `request` on the blocking pool and await its outcome.
///
/// Cancelling `cancel`, or dropping the returned future, stops the trim at
/// the next sample boundary; the blocking task then removes its staging file
/// and leaves the original untouched.
pub async fn trim_async(
    trimmer: Trimmer,
    request: TrimRequest,
    cancel: CancellationToken,
) -> Result<TrimReport> {
    let guard = cancel.clone().drop_guard();

    let result = tokio::task::spawn_blocking(move || trimmer.trim(&request, &cancel)).await;

    guard.disarm();
    match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            tracing::warn!(error = %e, "trim task did not complete");
            Err(Error::Cancelled)
        }
    }
}
