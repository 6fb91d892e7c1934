//! Timeout races. Whichever of the work and the timer settles first wins.
//!
//! [`race`] drops the losing future in place, which is right when the future
//! is only an observer (e.g. a clone of a shared result). [`race_detached`]
//! runs the work on its own task, so a timed-out backend call keeps going in
//! the background and its eventual output is dropped unobserved.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum RaceError {
    Elapsed(Duration),
    Panicked(String),
}

impl std::fmt::Display for RaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceError::Elapsed(limit) => write!(f, "timed out after {}ms", limit.as_millis()),
            RaceError::Panicked(msg) => write!(f, "task failed: {msg}"),
        }
    }
}

impl std::error::Error for RaceError {}

pub async fn race<F: Future>(limit: Duration, work: F) -> Result<F::Output, RaceError> {
    tokio::time::timeout(limit, work)
        .await
        .map_err(|_| RaceError::Elapsed(limit))
}

pub async fn race_detached<F>(limit: Duration, work: F) -> Result<F::Output, RaceError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut handle: JoinHandle<F::Output> = tokio::spawn(work);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(RaceError::Panicked(e.to_string())),
        // Dropping the handle detaches the task; it is not aborted.
        Err(_) => Err(RaceError::Elapsed(limit)),
    }
}
