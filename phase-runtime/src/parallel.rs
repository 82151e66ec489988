use std::future::Future;

use futures::stream::{self, StreamExt};
use phase_registry::PhaseExecError;

/// Outcome of a `parallel_map` call: per-item success or failure, in
/// arbitrary completion order (spec.md §4.6 point 5: "bounded concurrent map
/// with per-item error capture").
pub struct ParallelMapOutcome<T, O> {
    pub succeeded: Vec<(T, O)>,
    pub failed: Vec<(T, PhaseExecError)>,
}

/// Runs `f` over `items` with at most `max_concurrent` in flight at once,
/// built on `futures::stream::buffer_unordered` per SPEC_FULL.md §3's note
/// that this helper lives outside the `ExecutionContext` trait object (a
/// trait method can't be generic over `T`/`O`).
pub async fn parallel_map<T, O, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    f: F,
) -> ParallelMapOutcome<T, O>
where
    T: Clone + Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, PhaseExecError>> + Send + 'static,
{
    let max_concurrent = max_concurrent.max(1);
    let results: Vec<(T, Result<O, PhaseExecError>)> = stream::iter(items)
        .map(|item| {
            let item_for_result = item.clone();
            let fut = f(item);
            async move { (item_for_result, fut.await) }
        })
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (item, result) in results {
        match result {
            Ok(output) => succeeded.push((item, output)),
            Err(e) => failed.push((item, e)),
        }
    }

    ParallelMapOutcome { succeeded, failed }
}
