//! Fire-and-forget execution of search jobs.

use crate::domain::{ErrorKind, JobErrorInfo, JobId};
use crate::services::processor::{JobOutcome, SearchProcessor};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tracing::{error, info};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Decrements the in-flight count however the task ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    processor: Arc<SearchProcessor>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(processor: Arc<SearchProcessor>) -> Self {
        Self {
            processor,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Starts `job_id` on its own task and returns immediately.
    ///
    /// The handle is optional to await; failures and panics are written to the
    /// job row, never surfaced here. A panicking job is recorded as `failed`
    /// with an `UNKNOWN` error.
    pub fn submit(&self, job_id: JobId) -> JoinHandle<JobOutcome> {
        let processor = Arc::clone(&self.processor);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        info!(event = "job_submitted", job_id = %job_id, "Dispatching search job");

        tokio::spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(processor.run(job_id)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(event = "job_panicked", job_id = %job_id, panic = %message, "Search job panicked");
                    metrics::counter!("search_jobs_total", "status" => "panicked").increment(1);

                    let info = JobErrorInfo::new(
                        ErrorKind::Unknown,
                        format!("job task panicked: {message}"),
                    );
                    if let Err(e) = processor.abandon(job_id, info.clone()).await {
                        error!(job_id = %job_id, error = %e, "Could not record panicked job");
                    }
                    JobOutcome::Failed(info)
                }
            }
        })
    }

    /// Jobs submitted and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}
