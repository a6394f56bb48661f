use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::{DadError, Result};

use super::{JobState, RemoteClient};

/// Source of delays; tests swap in a recording clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry with doubling backoff: 1s, 2s, 4s, 8s, capped at 10s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// the retry budget is spent. Every failure comes back as
    /// [`DadError::TerminalRemote`] wrapping the last cause.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        log::info!("{} succeeded on attempt {}", operation, attempts);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempts <= self.max_retries => {
                    let delay = self.backoff(attempts);
                    log::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempts,
                        self.max_retries + 1,
                        err,
                        delay
                    );
                    sleeper.sleep(delay).await;
                }
                Err(err) => {
                    return Err(DadError::TerminalRemote {
                        operation: operation.to_string(),
                        attempts,
                        cause: Box::new(err),
                    });
                }
            }
        }
    }
}

/// How often and how long to wait on a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: None,
        }
    }
}

/// Terminal outcome of a polled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: String,
    pub state: JobState,
    pub failure_reason: Option<String>,
    pub waited: Duration,
}

/// Polls `job_status` until the job reaches a terminal state. Elapsed time
/// is counted from the sleeper's delays, not the wall clock.
pub async fn poll_job(
    client: &dyn RemoteClient,
    retry: &RetryPolicy,
    poll: &PollPolicy,
    sleeper: &dyn Sleeper,
    workspace_id: &str,
    notebook_id: &str,
    job_id: &str,
) -> Result<JobOutcome> {
    let mut waited = Duration::ZERO;

    loop {
        let status = retry
            .run(sleeper, "job status", || {
                client.job_status(workspace_id, notebook_id, job_id)
            })
            .await?;

        if status.state.is_terminal() {
            log::info!("Job {} finished: {}", job_id, status.state);
            return Ok(JobOutcome {
                job_id: job_id.to_string(),
                state: status.state,
                failure_reason: status.failure_reason,
                waited,
            });
        }

        if let Some(timeout) = poll.timeout {
            if waited >= timeout {
                return Err(DadError::PollTimeout {
                    job_id: job_id.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }
        }

        log::info!(
            "Job {} is {} ({}s elapsed)",
            job_id,
            status.state,
            waited.as_secs()
        );
        sleeper.sleep(poll.interval).await;
        waited += poll.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let schedule: Vec<u64> = (1..=5).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(schedule, vec![1, 2, 4, 8, 10]);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result = RetryPolicy::default()
            .run(&sleeper, "upload", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(DadError::transient("upload", "HTTP 503"))
                } else {
                    Ok("nb-1")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "nb-1");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_terminal() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::default()
            .run(&sleeper, "upload", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DadError::transient("upload", "HTTP 429"))
            })
            .await;

        match result {
            Err(DadError::TerminalRemote { attempts, cause, .. }) => {
                assert_eq!(attempts, 4);
                assert!(cause.is_transient());
            }
            other => panic!("expected terminal error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::default()
            .run(&sleeper, "upload", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DadError::RemoteRejected {
                    operation: "upload".to_string(),
                    status: 400,
                    body: "bad definition".to_string(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(DadError::TerminalRemote { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }
}
