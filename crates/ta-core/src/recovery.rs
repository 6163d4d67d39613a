use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use crate::errors::{PolicyError, RequestError, TransportErrorKind};
use crate::rate_limit::{self, RateLimitSnapshot, RateLimitTracker};
use crate::transport::{HttpRequest, HttpResponse, Transport};

pub const DEFAULT_MAX_NETWORK_RETRIES: u32 = 3;
pub const DEFAULT_BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// What went wrong, as far as retry decisions are concerned
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// No response was received
    Transport(TransportErrorKind),
    /// A response with a non-success status was received
    Status(&'a HttpResponse),
    /// Never retried
    Fatal,
}

/// Errors the recovery handler knows how to inspect
pub trait Recoverable: Sized {
    fn failure(&self) -> Failure<'_>;

    /// Convert a 429 failure whose retry budget ran out into the caller's
    /// distinguished rate-limited error
    fn rate_limited(self, snapshot: Option<RateLimitSnapshot>, retry_after: Option<Duration>) -> Self;
}

/// Retry decision for a single failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    RateLimited {
        retry_after: Option<Duration>,
        snapshot: Option<RateLimitSnapshot>,
    },
    Fatal,
}

/// Validated retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    max_network_retries: u32,
    base_retry_delay: Duration,
    max_retry_delay: Duration,
    retryable_network_errors: BTreeSet<TransportErrorKind>,
    retryable_status_codes: BTreeSet<u16>,
    max_rate_limit_retries: u32,
}

impl RecoveryPolicy {
    pub fn new(
        max_network_retries: u32,
        base_retry_delay: Duration,
        max_retry_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if base_retry_delay.is_zero() {
            return Err(PolicyError::NonPositiveBaseDelay);
        }
        if max_retry_delay < base_retry_delay {
            return Err(PolicyError::MaxBelowBase {
                base: base_retry_delay,
                max: max_retry_delay,
            });
        }

        Ok(Self {
            max_network_retries,
            base_retry_delay,
            max_retry_delay,
            retryable_network_errors: Self::default_network_errors(),
            retryable_status_codes: Self::default_status_codes(),
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        })
    }

    /// Like [`RecoveryPolicy::new`] but accepts a signed retry count, as read
    /// from configuration files
    pub fn from_signed(
        max_network_retries: i64,
        base_retry_delay: Duration,
        max_retry_delay: Duration,
    ) -> Result<Self, PolicyError> {
        let retries = u32::try_from(max_network_retries)
            .map_err(|_| PolicyError::NegativeRetryCount(max_network_retries))?;
        Self::new(retries, base_retry_delay, max_retry_delay)
    }

    /// Exactly one attempt, no delays, 429s included
    pub fn disabled() -> Self {
        Self {
            max_network_retries: 0,
            max_rate_limit_retries: 0,
            ..Self::default()
        }
    }

    pub fn default_network_errors() -> BTreeSet<TransportErrorKind> {
        BTreeSet::from([
            TransportErrorKind::Timeout,
            TransportErrorKind::HostUnreachable,
            TransportErrorKind::ConnectionLost,
            TransportErrorKind::DnsFailure,
        ])
    }

    pub fn default_status_codes() -> BTreeSet<u16> {
        BTreeSet::from([500, 502, 503, 504])
    }

    pub fn with_retryable_network_errors(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_network_errors = kinds.into_iter().collect();
        self
    }

    /// Replace the retryable status set. 429 and other 4xx codes are ignored
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().filter(|c| *c >= 500).collect();
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn max_network_retries(&self) -> u32 {
        self.max_network_retries
    }

    pub fn base_retry_delay(&self) -> Duration {
        self.base_retry_delay
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn max_rate_limit_retries(&self) -> u32 {
        self.max_rate_limit_retries
    }

    pub fn retryable_network_errors(&self) -> &BTreeSet<TransportErrorKind> {
        &self.retryable_network_errors
    }

    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    pub fn is_disabled(&self) -> bool {
        self.max_network_retries == 0 && self.max_rate_limit_retries == 0
    }

    /// Delay before retry number `retry` (1-indexed):
    /// `min(base * 2^(retry - 1), max)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_retry_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_retry_delay, |delay| delay.min(self.max_retry_delay))
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_network_retries: DEFAULT_MAX_NETWORK_RETRIES,
            base_retry_delay: DEFAULT_BASE_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            retryable_network_errors: Self::default_network_errors(),
            retryable_status_codes: Self::default_status_codes(),
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }
}

/// Runs async operations with classification-driven retries.
///
/// Stateless per call: one handler can serve any number of concurrent
/// requests. Dropping the returned future stops any further attempts.
#[derive(Debug, Clone, Default)]
pub struct NetworkRecoveryHandler {
    policy: RecoveryPolicy,
    rate_limits: Arc<RateLimitTracker>,
}

impl NetworkRecoveryHandler {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            rate_limits: Arc::new(RateLimitTracker::new()),
        }
    }

    pub fn with_tracker(policy: RecoveryPolicy, rate_limits: Arc<RateLimitTracker>) -> Self {
        Self {
            policy,
            rate_limits,
        }
    }

    pub fn disabled() -> Self {
        Self::new(RecoveryPolicy::disabled())
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limits
    }

    /// Decide whether `error` warrants another attempt
    pub fn classify<E: Recoverable>(&self, error: &E) -> Classification {
        match error.failure() {
            Failure::Transport(kind) if self.policy.retryable_network_errors.contains(&kind) => {
                Classification::Retryable
            }
            Failure::Transport(_) | Failure::Fatal => Classification::Fatal,
            Failure::Status(response) if response.status == StatusCode::TOO_MANY_REQUESTS => {
                Classification::RateLimited {
                    retry_after: rate_limit::retry_after(&response.headers),
                    snapshot: RateLimitSnapshot::parse(
                        &response.headers,
                        response.status.as_u16(),
                        &response.path,
                    ),
                }
            }
            Failure::Status(response)
                if self
                    .policy
                    .retryable_status_codes
                    .contains(&response.status.as_u16()) =>
            {
                Classification::Retryable
            }
            Failure::Status(_) => Classification::Fatal,
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or exhausts its
    /// retry budget. The last failure is returned unchanged, except for an
    /// exhausted 429 which goes through [`Recoverable::rate_limited`].
    pub async fn execute_with_recovery<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recoverable + std::fmt::Display,
    {
        let mut network_retries = 0u32;
        let mut rate_limit_retries = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if let Failure::Status(response) = error.failure() {
                self.rate_limits
                    .record(&response.headers, response.status.as_u16(), &response.path);
            }

            let delay = match self.classify(&error) {
                Classification::Fatal => {
                    debug!(error = %error, "Failure is not retryable");
                    return Err(error);
                }
                Classification::Retryable => {
                    if network_retries >= self.policy.max_network_retries {
                        warn!(
                            attempts = network_retries + 1,
                            error = %error,
                            "Giving up after exhausting network retries"
                        );
                        return Err(error);
                    }
                    network_retries += 1;
                    let delay = self.policy.delay_for_retry(network_retries);
                    warn!(
                        retry = network_retries,
                        max_retries = self.policy.max_network_retries,
                        ?delay,
                        error = %error,
                        "Retrying after recoverable failure"
                    );
                    delay
                }
                Classification::RateLimited {
                    retry_after,
                    snapshot,
                } => {
                    if rate_limit_retries >= self.policy.max_rate_limit_retries {
                        warn!(
                            retries = rate_limit_retries,
                            ?retry_after,
                            "Giving up after exhausting rate limit retries"
                        );
                        return Err(error.rate_limited(snapshot, retry_after));
                    }
                    rate_limit_retries += 1;
                    let delay = retry_after.unwrap_or(self.policy.base_retry_delay);
                    warn!(
                        retry = rate_limit_retries,
                        max_retries = self.policy.max_rate_limit_retries,
                        ?delay,
                        "Rate limited, waiting before retry"
                    );
                    delay
                }
            };

            tokio::time::sleep(delay).await;
        }
    }

    /// Send `request` through `transport`, treating non-2xx responses as failures
    #[instrument(skip(self, transport, request), fields(method = %request.method, path = %request.path()))]
    pub async fn send(
        &self,
        transport: &dyn Transport,
        request: &HttpRequest,
    ) -> Result<HttpResponse, RequestError> {
        self.execute_with_recovery(|| {
            let request = request.clone();
            async move {
                let response = transport.send(request).await?;
                if response.is_success() {
                    self.rate_limits
                        .record(&response.headers, response.status.as_u16(), &response.path);
                    Ok(response)
                } else {
                    Err(RequestError::Status(Box::new(response)))
                }
            }
        })
        .await
    }
}
