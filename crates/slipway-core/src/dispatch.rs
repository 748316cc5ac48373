//! Bounded-concurrency unit dispatch.
//!
//! Every build/deploy/destroy unit runs as its own task behind a counting
//! semaphore. Units fail independently: a failure is recorded on the shared
//! [`ErrorTally`] and never aborts or delays sibling units. `run` returns
//! only once every unit has finished, and its return value alone decides
//! the process exit status.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

// ---------------------------------------------------------------------------
// ErrorTally
// ---------------------------------------------------------------------------

/// Process-wide failure counter. The only mutable state shared between
/// concurrently running units.
#[derive(Debug, Default)]
pub struct ErrorTally {
    errors: AtomicUsize,
}

impl ErrorTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run every unit with at most `concurrency` executing at once.
///
/// Each unit receives the shared tally and records its own failures; a unit
/// task that panics is also counted. Returns the final error count after
/// all units have finished.
pub async fn run<T, F, Fut>(units: Vec<T>, concurrency: usize, run_unit: F) -> usize
where
    T: Send + 'static,
    F: Fn(T, Arc<ErrorTally>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let gate = Arc::new(Semaphore::new(concurrency.max(1)));
    let tally = Arc::new(ErrorTally::new());
    let mut tasks = JoinSet::new();

    for unit in units {
        let gate = Arc::clone(&gate);
        let tally = Arc::clone(&tally);
        let run_unit = run_unit.clone();
        tasks.spawn(async move {
            let _slot = match gate.acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed; treat it as a unit failure
                // rather than panicking if that ever changes.
                Err(_) => {
                    tally.record();
                    return;
                }
            };
            run_unit(unit, Arc::clone(&tally)).await;
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if joined.is_err() {
            tally.record();
        }
    }

    tally.count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Observes how many units run at once and how many ran in total.
    #[derive(Default)]
    struct Probe {
        active: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl Probe {
        fn enter(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn run_probed(concurrency: usize, failing: &[usize]) -> (usize, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let failing: Vec<usize> = failing.to_vec();
        let errors = {
            let probe = Arc::clone(&probe);
            run(
                (0..10).collect::<Vec<usize>>(),
                concurrency,
                move |unit, tally| {
                    let probe = Arc::clone(&probe);
                    let failing = failing.clone();
                    async move {
                        probe.enter();
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        if failing.contains(&unit) {
                            tally.record();
                        }
                        probe.exit();
                    }
                },
            )
            .await
        };
        (errors, probe)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serial_dispatch_runs_one_at_a_time() {
        let (errors, probe) = run_probed(1, &[]).await;
        assert_eq!(errors, 0);
        assert_eq!(probe.started.load(Ordering::SeqCst), 10);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn parallel_dispatch_respects_the_ceiling() {
        let (errors, probe) = run_probed(3, &[]).await;
        assert_eq!(errors, 0);
        assert_eq!(probe.started.load(Ordering::SeqCst), 10);
        assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_are_tallied_without_aborting_siblings() {
        let (errors, probe) = run_probed(3, &[1, 4, 7]).await;
        assert_eq!(errors, 3);
        assert_eq!(probe.started.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serial_failures_are_tallied() {
        let (errors, probe) = run_probed(1, &[0, 9]).await;
        assert_eq!(errors, 2);
        assert_eq!(probe.started.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped_to_one() {
        let errors = run(vec![1u8, 2, 3], 0, |_, _| async {}).await;
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn unit_panic_is_counted() {
        let errors = run(vec![1u8, 2], 2, |unit, _| async move {
            if unit == 1 {
                panic!("unit exploded");
            }
        })
        .await;
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn one_unit_may_record_multiple_errors() {
        let errors = run(vec![()], 1, |_, tally| async move {
            tally.record();
            tally.record();
        })
        .await;
        assert_eq!(errors, 2);
    }
}
