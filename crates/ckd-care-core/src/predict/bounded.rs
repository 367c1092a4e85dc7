//! Run a blocking model call with an optional deadline.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Why a bounded call produced no value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundedError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("worker stopped without a result")]
    Aborted,
}

/// Run `task` inline when `timeout` is `None`, otherwise on a worker thread
/// that is abandoned once the deadline passes.
pub fn run_bounded<T, F>(name: &str, timeout: Option<Duration>, task: F) -> Result<T, BoundedError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let Some(limit) = timeout else {
        return Ok(task());
    };

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            // The receiver may have given up already
            let _ = tx.send(task());
        })
        .map_err(|_| BoundedError::Aborted)?;

    match rx.recv_timeout(limit) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(BoundedError::TimedOut(limit)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(BoundedError::Aborted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_without_timeout() {
        assert_eq!(run_bounded("t", None, || 7), Ok(7));
    }

    #[test]
    fn test_completes_within_deadline() {
        let result = run_bounded("t", Some(Duration::from_secs(5)), || "done");
        assert_eq!(result, Ok("done"));
    }

    #[test]
    fn test_times_out() {
        let result = run_bounded("t", Some(Duration::from_millis(20)), || {
            thread::sleep(Duration::from_millis(500));
            1
        });
        assert_eq!(result, Err(BoundedError::TimedOut(Duration::from_millis(20))));
    }

    #[test]
    fn test_panicking_worker_is_aborted() {
        let result: Result<u8, _> = run_bounded("t", Some(Duration::from_secs(5)), || {
            panic!("model crashed")
        });
        assert_eq!(result, Err(BoundedError::Aborted));
    }
}
