//! Bounded retry with jittered delays
//!
//! Every attempt, including the first, is preceded by a politeness delay of
//! `base * (1 + U[0,1))`. A retryable failure adds a further backoff of the
//! base delay (doubled for connection failures and timeouts) before the next
//! attempt. A fatal failure ends the sequence at once.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FailureKind, FetchFailure, FetchOutcome};
use crate::crawler::stop::StopSignal;
use crate::state::TaskLifecycle;
use std::future::Future;
use std::time::Duration;

/// Final outcome of a retry sequence plus the number of attempts made
#[derive(Debug)]
pub struct Attempted<T> {
    pub outcome: FetchOutcome<T>,
    pub attempts: u32,
}

/// Delay and attempt limits shared by page fetches and resource downloads
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy; at least one attempt is always allowed
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries: max_retries.max(1),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.base_delay(), config.max_retries)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The politeness delay slept before an attempt
    pub fn jittered_delay(&self) -> Duration {
        self.base_delay.mul_f64(1.0 + rand::random::<f64>())
    }

    /// Extra delay slept after a retryable failure of the given kind
    pub fn backoff_for(&self, kind: FailureKind) -> Duration {
        self.base_delay * kind.backoff_factor()
    }

    /// Runs `fetch` until it succeeds, fails fatally, or runs out of attempts
    ///
    /// Each attempt moves `lifecycle` into `Fetching`; the sequence ends with
    /// `Succeeded` or `Abandoned`. If `stop` is set before the first attempt
    /// the lifecycle stays `Pending` and the outcome is a `Stopped` failure
    /// with zero attempts.
    ///
    /// # Arguments
    ///
    /// * `url` - Used for logging only
    /// * `stop` - Checked before every attempt
    /// * `lifecycle` - Receives one transition per attempt and the final state
    /// * `fetch` - Produces one attempt's future
    ///
    /// # Returns
    ///
    /// The last attempt's outcome and how many attempts were made
    pub async fn attempt<T, F, Fut>(
        &self,
        url: &str,
        stop: &StopSignal,
        lifecycle: &mut TaskLifecycle,
        mut fetch: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchOutcome<T>>,
    {
        let mut attempts = 0;

        loop {
            if stop.is_stopped() {
                return self.stopped(url, lifecycle, attempts);
            }

            pause(self.jittered_delay()).await;

            if stop.is_stopped() {
                return self.stopped(url, lifecycle, attempts);
            }

            lifecycle.begin_attempt();
            attempts += 1;

            match fetch().await {
                FetchOutcome::Success(value) => {
                    lifecycle.succeed();
                    if attempts > 1 {
                        tracing::debug!("Fetched {} after {} attempts", url, attempts);
                    }
                    return Attempted {
                        outcome: FetchOutcome::Success(value),
                        attempts,
                    };
                }
                FetchOutcome::FatalFailure(failure) => {
                    lifecycle.abandon();
                    tracing::error!(
                        "Abandoning {} after {} attempt(s): {}",
                        url,
                        attempts,
                        failure
                    );
                    return Attempted {
                        outcome: FetchOutcome::FatalFailure(failure),
                        attempts,
                    };
                }
                FetchOutcome::RetryableFailure(failure) => {
                    if attempts >= self.max_retries {
                        lifecycle.abandon();
                        tracing::error!(
                            "Abandoning {} after {} attempt(s): {}",
                            url,
                            attempts,
                            failure
                        );
                        return Attempted {
                            outcome: FetchOutcome::RetryableFailure(failure),
                            attempts,
                        };
                    }

                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempts,
                        self.max_retries,
                        url,
                        failure
                    );
                    pause(self.backoff_for(failure.kind)).await;
                }
            }
        }
    }

    fn stopped<T>(&self, url: &str, lifecycle: &mut TaskLifecycle, attempts: u32) -> Attempted<T> {
        if attempts > 0 {
            lifecycle.abandon();
        }
        tracing::debug!("Stop requested; not fetching {}", url);
        Attempted {
            outcome: FetchOutcome::FatalFailure(FetchFailure::stopped()),
            attempts,
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
