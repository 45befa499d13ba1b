//! Per-sample progress reporting for a running trim.

/// Receives progress from the copy loop.
///
/// Wraps a callback that is handed the number of samples written so far and
/// the source timestamp of the sample just written. It runs on the thread
/// doing the trim, so it must not block for long.
pub struct ProgressSender {
    callback: Box<dyn Fn(usize, i64) + Send + Sync>,
}

impl ProgressSender {
    pub fn new(callback: impl Fn(usize, i64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sender that discards every report.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_, _| {}),
        }
    }

    pub fn send(&self, samples_written: usize, pts_us: i64) {
        (self.callback)(samples_written, pts_us);
    }
}

impl Default for ProgressSender {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_send_reaches_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        let progress = ProgressSender::new(move |samples, _| sink.store(samples, Ordering::SeqCst));

        progress.send(7, 1_400_000);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        ProgressSender::noop().send(1, 0);
    }
}
