use crate::recorder::Recorder;
use kvload_core::RequestOutcome;
use std::{future::Future, sync::Arc};

/// Transaction hook the executor wraps around every iteration. Not intended to be used manually.
///
/// Records the outcome into the scenario's recorder and, with the `metrics` feature, into the
/// `metrics` facade.
pub async fn transaction_hook<T>(func: T) -> RequestOutcome
where
    T: Future<Output = RequestOutcome>,
{
    let outcome = func.await;

    let recorded = TRANSACTION_HOOK.try_with(|hook| hook.recorder.record(&outcome));
    if recorded.is_err() {
        tracing::error!("No hook available.");
    }

    #[cfg(feature = "metrics")]
    record_metrics(&outcome);

    outcome
}

#[cfg(feature = "metrics")]
fn record_metrics(outcome: &RequestOutcome) {
    let tags = outcome.tags;
    metrics::counter!(
        "kvload_requests",
        "name" => tags.name,
        "op" => tags.op.unwrap_or(""),
        "status" => outcome.status_class()
    )
    .increment(1);
    metrics::histogram!(
        "kvload_request_duration",
        "name" => tags.name,
        "op" => tags.op.unwrap_or(""),
        "status" => outcome.status_class()
    )
    .record(outcome.latency.as_secs_f64());

    for result in &outcome.checks {
        let passed = if result.passed { "pass" } else { "fail" };
        metrics::counter!("kvload_checks", "check" => result.check.name(), "result" => passed)
            .increment(1);
    }
}

#[derive(Clone)]
pub(crate) struct TransactionData {
    pub recorder: Arc<Recorder>,
}

tokio::task_local! {
    pub(crate) static TRANSACTION_HOOK: TransactionData;
}
