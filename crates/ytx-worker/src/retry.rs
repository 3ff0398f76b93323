//! Retry utilities with classified failures and exponential backoff.
//!
//! A [`RetryPolicy`] wraps one remote call. Each failure is classified by
//! the caller as transient, rate-limited or fatal: fatal errors propagate
//! immediately, the others are retried with a growing delay until the
//! attempt budget runs out. The wrapped operation must be safe to call more
//! than once.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics;

/// Maximum extra delay added by jitter, as a fraction of the curve delay.
const JITTER_FRACTION: f64 = 0.1;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network blip, 5xx, timeout: retry on the backoff curve
    Transient,
    /// Provider asked us to slow down, possibly saying for how long
    RateLimited { retry_after: Option<Duration> },
    /// Bad input, auth failure, irrecoverable response: never retried
    Fatal,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::RateLimited { .. } => "rate_limited",
            FailureClass::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Add up to +10% random jitter to each delay.
    pub jitter: bool,
    /// Per-attempt timeout; an attempt exceeding it counts as transient.
    pub attempt_timeout: Option<Duration>,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: true,
            attempt_timeout: None,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Transcript and metadata fetches: 3 attempts, 2s base, 30s cap.
    pub fn network(operation_name: impl Into<String>) -> Self {
        Self::new(operation_name)
            .with_max_attempts(3)
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(30))
    }

    /// Generic API calls: 5 attempts, 5s base, 120s cap.
    pub fn api(operation_name: impl Into<String>) -> Self {
        Self::new(operation_name)
            .with_max_attempts(5)
            .with_base_delay(Duration::from_secs(5))
            .with_max_delay(Duration::from_secs(120))
    }

    /// Model inference: 5 attempts, 2s base, 60s cap.
    pub fn llm(operation_name: impl Into<String>) -> Self {
        Self::new(operation_name)
            .with_max_attempts(5)
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(60))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Curve delay before retry number `retry` (0-based), without jitter.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay before retry number `retry` given the failure class and the
    /// previous delay.
    ///
    /// The backoff curve is capped at `max_delay`; a provider `Retry-After`
    /// hint is honoured in full even above the cap. The result never drops
    /// below `previous`.
    fn next_delay(&self, retry: u32, class: FailureClass, previous: Duration) -> Duration {
        let mut delay = self.delay_for_attempt(retry);
        if self.jitter {
            delay = delay.mul_f64(1.0 + rand::random::<f64>() * JITTER_FRACTION);
        }
        delay = delay.min(self.max_delay);
        if let FailureClass::RateLimited {
            retry_after: Some(hint),
        } = class
        {
            delay = delay.max(hint);
        }
        delay.max(previous)
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt
    /// budget is spent.
    pub async fn execute<F, Fut, T, E, C>(
        &self,
        operation: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        C: Fn(&E) -> FailureClass,
    {
        self.execute_observed(operation, classify, |_| {}).await
    }

    /// Like [`execute`](Self::execute), reporting every failed attempt to
    /// `observe` before sleeping.
    pub async fn execute_observed<F, Fut, T, E, C, O>(
        &self,
        mut operation: F,
        classify: C,
        mut observe: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        C: Fn(&E) -> FailureClass,
        O: FnMut(&RetryContext),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut ctx = RetryContext::new(max_attempts);

        loop {
            ctx.attempt += 1;

            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result.map_err(AttemptError::Failed),
                    Err(_) => Err(AttemptError::TimedOut(limit)),
                },
                None => operation().await.map_err(AttemptError::Failed),
            };

            let error = match outcome {
                Ok(value) => {
                    if ctx.attempt > 1 {
                        debug!(
                            operation = %self.operation_name,
                            attempts = ctx.attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = match &error {
                AttemptError::Failed(e) => classify(e),
                AttemptError::TimedOut(_) => FailureClass::Transient,
            };
            ctx.last_class = Some(class);
            ctx.last_error = Some(error.to_string());
            metrics::record_retry_attempt(&self.operation_name, class);

            if !class.is_retryable() {
                ctx.next_delay = None;
                observe(&ctx);
                warn!(
                    operation = %self.operation_name,
                    attempt = ctx.attempt,
                    class = %class,
                    error = %error,
                    "Fatal failure, not retrying"
                );
                return match error {
                    AttemptError::Failed(error) => Err(RetryError::Fatal {
                        error,
                        attempts: ctx.attempt,
                    }),
                    // Timeouts always classify as transient.
                    timed_out => Err(RetryError::Exhausted {
                        last: timed_out,
                        attempts: ctx.attempt,
                    }),
                };
            }

            if ctx.attempt >= max_attempts {
                ctx.next_delay = None;
                observe(&ctx);
                warn!(
                    operation = %self.operation_name,
                    attempts = ctx.attempt,
                    class = %class,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    last: error,
                    attempts: ctx.attempt,
                });
            }

            let previous = ctx.next_delay.unwrap_or(Duration::ZERO);
            let delay = self.next_delay(ctx.attempt - 1, class, previous);
            ctx.next_delay = Some(delay);
            observe(&ctx);
            warn!(
                operation = %self.operation_name,
                attempt = ctx.attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                class = %class,
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Progress of one [`RetryPolicy::execute`] call, reported after each
/// failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    /// 1-based index of the attempt that just failed
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_class: Option<FailureClass>,
    pub last_error: Option<String>,
    /// Delay before the next attempt; `None` when no retry follows
    pub next_delay: Option<Duration>,
}

impl RetryContext {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_class: None,
            last_error: None,
            next_delay: None,
        }
    }

    pub fn will_retry(&self) -> bool {
        self.next_delay.is_some()
    }
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Final failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Classified fatal; no further attempts were made.
    #[error("{error}")]
    Fatal { error: E, attempts: u32 },

    /// Every attempt failed with a retryable error.
    #[error("{last}")]
    Exhausted { last: AttemptError<E>, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RetryError::Fatal { .. })
    }

    /// The operation's own error, if the last attempt did not time out.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Fatal { error, .. } => Some(error),
            RetryError::Exhausted {
                last: AttemptError::Failed(error),
                ..
            } => Some(error),
            RetryError::Exhausted { .. } => None,
        }
    }
}

/// Classify an error by its message text.
///
/// Rate-limit wording wins over everything else; network and temporary
/// server errors are transient, as are empty or JSON-less model replies.
/// Anything unrecognised is fatal.
pub fn classify_message(message: &str) -> FailureClass {
    let msg = message.to_lowercase();
    if is_rate_limit_message(&msg) {
        FailureClass::RateLimited { retry_after: None }
    } else if is_network_error_message(&msg)
        || is_temporary_api_error_message(&msg)
        || is_empty_model_response_message(&msg)
    {
        FailureClass::Transient
    } else {
        FailureClass::Fatal
    }
}

pub fn is_network_error_message(message: &str) -> bool {
    const PATTERNS: [&str; 8] = [
        "connection error",
        "timeout",
        "timed out",
        "network",
        "dns",
        "connection reset",
        "connection refused",
        "unreachable",
    ];
    let msg = message.to_lowercase();
    PATTERNS.iter().any(|p| msg.contains(p))
}

pub fn is_rate_limit_message(message: &str) -> bool {
    const PATTERNS: [&str; 5] = [
        "rate limit",
        "too many requests",
        "quota exceeded",
        "429",
        "rate exceeded",
    ];
    let msg = message.to_lowercase();
    PATTERNS.iter().any(|p| msg.contains(p))
}

pub fn is_temporary_api_error_message(message: &str) -> bool {
    const PATTERNS: [&str; 8] = [
        "internal server error",
        "500",
        "502",
        "503",
        "504",
        "service unavailable",
        "temporary",
        "try again",
    ];
    let msg = message.to_lowercase();
    PATTERNS.iter().any(|p| msg.contains(p))
}

pub fn is_empty_model_response_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("empty content") || msg.contains("no json found")
}

/// State tracker for repeated operations that may fail intermittently.
///
/// Useful for background loops (like the worker's claim loop) that run
/// continuously and should suppress log spam after repeated failures.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    /// Create a new failure tracker.
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                failures = self.consecutive_failures,
                "Operation recovered after consecutive failures"
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
