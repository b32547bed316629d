//! [`PeriodicTask`] – a job fired at a fixed rate on a dedicated thread.
//!
//! Firings are serialized: a job that overruns its period delays the next
//! firing instead of overlapping it, and the schedule does not try to catch
//! up missed firings.  A firing that panics is logged and the schedule
//! carries on.  [`PeriodicTask::stop`] joins the thread, so once it returns
//! the job is guaranteed not to run again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rangebridge_types::BridgeError;
use tracing::{debug, error};

/// Handle to a running periodic job.  Dropping it stops the job.
pub struct PeriodicTask {
    period: Duration,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a thread named `name` that calls `job` immediately and then
    /// once every `period`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] if the OS refuses to spawn the
    /// thread.
    pub fn spawn<F>(name: &str, period: Duration, mut job: F) -> Result<Self, BridgeError>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    if panic::catch_unwind(AssertUnwindSafe(&mut job)).is_err() {
                        error!(thread = %thread_name, "periodic job panicked; next firing still scheduled");
                    }
                    let Some(next) = deadline.checked_add(period) else {
                        // The next deadline is not representable: park until stopped.
                        let _ = stop_rx.recv();
                        break;
                    };
                    let now = Instant::now();
                    deadline = next.max(now);
                    match stop_rx.recv_timeout(deadline - now) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| BridgeError::InvalidState(format!("cannot spawn thread '{name}': {e}")))?;
        debug!(thread = name, period_s = period.as_secs_f64(), "periodic task spawned");
        Ok(Self {
            period,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// `true` until [`stop`][Self::stop] is called.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop firing and wait for an in-flight firing to finish.  Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already be gone if the job panicked.
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("periodic thread panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn fires_repeatedly_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("test-fire", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(task.is_running());
        thread::sleep(Duration::from_millis(60));
        task.stop();
        assert!(!task.is_running());

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 3, "expected several firings, got {fired}");

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), fired, "job ran after stop");
    }

    #[test]
    fn stop_waits_for_in_flight_job() {
        let inside = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicUsize::new(0));
        let (i, f) = (Arc::clone(&inside), Arc::clone(&finished));
        let mut task = PeriodicTask::spawn("test-slow", Duration::from_millis(1), move || {
            i.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(40));
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        while !inside.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        task.stop();
        let after_stop = finished.load(Ordering::SeqCst);
        assert!(after_stop >= 1, "in-flight job must complete before stop returns");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(finished.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn overrunning_job_never_overlaps() {
        let active = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (a, o) = (Arc::clone(&active), Arc::clone(&overlapped));
        let mut task = PeriodicTask::spawn("test-overrun", Duration::from_millis(1), move || {
            if a.fetch_add(1, Ordering::SeqCst) > 0 {
                o.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(5));
            a.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();
        thread::sleep(Duration::from_millis(40));
        task.stop();
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_firing_does_not_end_the_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("test-panic", Duration::from_millis(2), move || {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first firing fails");
            }
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(task.is_running());
        task.stop();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn unrepresentable_period_parks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("test-huge", Duration::MAX, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(task.is_running());
        task.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut task = PeriodicTask::spawn("test-idem", Duration::from_millis(5), || {}).unwrap();
        task.stop();
        task.stop();
        assert!(!task.is_running());
        assert_eq!(task.period(), Duration::from_millis(5));
    }
}
