//! Pavilion core library — transport-agnostic membership-gate logic.
//!
//! `pavilion-core` holds the two subsystems the web frontend wraps at its
//! request boundary, kept free of HTTP and storage concerns so they can be
//! exercised directly in tests:
//!
//! - [`rate_limit`] — bounded, time-windowed request counters keyed by
//!   client identity ([`RateLimiter`]).
//! - [`credentials`] — password hashing plus single-use, expiring secrets on
//!   a user record ([`CredentialSet`]).
//! - [`clock`] — the injectable time source both depend on ([`Clock`]).
//! - [`error`] — unified error type ([`CoreError`]) and result alias
//!   ([`CoreResult`]).

pub mod clock;
pub mod credentials;
pub mod error;
pub mod password;
pub mod rate_limit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::CredentialSet;
pub use error::{CoreError, CoreResult};
pub use rate_limit::{RateDecision, RateLimitOptions, RateLimiter};
