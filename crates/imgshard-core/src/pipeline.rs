//! Bounded worker pool (C5, §4.5) — `T` OS threads draining rows off an
//! `mpsc` channel, fetching under retry, with a counting semaphore
//! gating admission at `2T` in-flight rows.
//!
//! Modeled on the teacher's preference for real OS threads over a task
//! runtime (`rayon::scope` in `papeline-openalex::runner`,
//! `std::thread::Builder::spawn` for the lance writer thread in
//! `papeline-semantic-scholar::runner`) — here `std::thread::scope`
//! replaces `rayon::scope` since the semaphore needs to be acquired by
//! the producer and released by the consumer across the pool boundary.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;

use crate::retry::fetch_row;
use crate::row::{RawRowResult, Row};
use crate::semaphore::{OwnedSemaphoreGuard, Semaphore};

/// One row paired with its fetch result, handed back to the coordinator
/// in arrival (unordered) order (§5 "Ordering guarantees"). Carries the
/// semaphore permit admitted under — dropped only once the caller's
/// `on_result` returns, which is what actually releases it.
pub struct PipelineResult {
    pub row: Row,
    pub raw: RawRowResult,
    permit: OwnedSemaphoreGuard,
}

/// Run C2→C1 for every row in `rows` across `thread_count` workers,
/// invoking `on_result` on the calling thread for each completed row in
/// arrival order. `on_result` is where C6 runs and where the semaphore
/// permit for that row is released — by the time `on_result` returns,
/// the permit for its row has already been accounted for as released by
/// the RAII guard.
pub fn run_pipeline(
    rows: Vec<Row>,
    thread_count: usize,
    timeout_secs: u64,
    retries: u32,
    ua_token: &str,
    disallowed_directives: &HashSet<String>,
    mut on_result: impl FnMut(PipelineResult),
) {
    let thread_count = thread_count.max(1);
    let semaphore = Arc::new(Semaphore::new(2 * thread_count));
    let (row_tx, row_rx) = mpsc::channel::<(Row, OwnedSemaphoreGuard)>();
    let (result_tx, result_rx) = mpsc::channel::<PipelineResult>();
    let row_rx = Arc::new(std::sync::Mutex::new(row_rx));

    std::thread::scope(|scope| {
        for _ in 0..thread_count {
            let row_rx = Arc::clone(&row_rx);
            let result_tx = result_tx.clone();
            scope.spawn(move || loop {
                let next = {
                    let rx = row_rx.lock().unwrap();
                    rx.recv()
                };
                let Ok((row, permit)) = next else { break };
                let raw = fetch_row(&row.url, retries, timeout_secs, ua_token, disallowed_directives);
                if result_tx.send(PipelineResult { row, raw, permit }).is_err() {
                    break;
                }
            });
        }
        drop(result_tx);

        // Producer: acquire a permit before a row is admitted into
        // worker input, bounding rows in flight + queued at 2T. The
        // permit travels with the row through the worker and back to
        // the coordinator inside `PipelineResult`.
        let producer_rows = rows;
        let producer_sem = Arc::clone(&semaphore);
        scope.spawn(move || {
            for row in producer_rows {
                let permit = producer_sem.acquire_owned();
                if row_tx.send((row, permit)).is_err() {
                    break;
                }
            }
        });

        // Coordinator: drain results as they arrive, run the caller's
        // post-processing, then let the permit drop — releasing it only
        // after `on_result` returns, on every path (normal return or
        // panic unwind), because the guard lives inside `result` and is
        // dropped at the end of this scope regardless of how we leave it.
        for result in result_rx {
            on_result(result);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::UrlSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(i: u64) -> Row {
        Row {
            row_index: i,
            url: UrlSpec::Single("http://127.0.0.1:1".to_string()),
            payload: vec![],
        }
    }

    #[test]
    fn every_row_produces_exactly_one_result() {
        let rows: Vec<Row> = (0..20).map(row).collect();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        run_pipeline(rows, 4, 1, 0, "", &HashSet::new(), move |result| {
            seen_clone.lock().unwrap().push(result.row.row_index);
        });

        let mut indices = seen.lock().unwrap().clone();
        indices.sort_unstable();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn backpressure_never_exceeds_2t_in_flight() {
        let rows: Vec<Row> = (0..40).map(row).collect();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let in_flight_cb = in_flight.clone();
        let max_seen_cb = max_seen.clone();

        run_pipeline(rows, 3, 1, 0, "", &HashSet::new(), move |_result| {
            let now = in_flight_cb.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen_cb.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(1));
            in_flight_cb.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(max_seen.load(Ordering::SeqCst) <= 2 * 3);
    }
}
