//! Request-execution core for the tonearm client
//!
//! Everything that talks to the network goes through here:
//!
//! - [`Transport`]: the actual HTTP exchange ([`ReqwestTransport`] by default)
//! - [`NetworkRecoveryHandler`]: classification-driven retries with
//!   exponential backoff, and a separate `Retry-After` budget for 429s
//! - [`RateLimitTracker`]: quota headers parsed into [`RateLimitSnapshot`]s
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ta_core::{HttpRequest, HttpTimeouts, NetworkRecoveryHandler, RecoveryPolicy, ReqwestTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RecoveryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(5))?;
//! let handler = NetworkRecoveryHandler::new(policy);
//! let transport = ReqwestTransport::new(&HttpTimeouts::default(), None)?;
//!
//! let request = HttpRequest::get("https://api.example.com/v1/albums/1".parse()?);
//! let response = handler.send(&transport, &request).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod rate_limit;
pub mod recovery;
pub mod transport;

pub use errors::{PolicyError, RequestError, Result, TransportError, TransportErrorKind};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
pub use recovery::{Classification, Failure, NetworkRecoveryHandler, Recoverable, RecoveryPolicy};
pub use transport::{HttpRequest, HttpResponse, HttpTimeouts, ReqwestTransport, Transport};
