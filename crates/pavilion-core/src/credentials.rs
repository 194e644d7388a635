//! Credential lifecycle: password hashes, email verification codes, and
//! password-reset tokens attached to a user record.
//!
//! [`CredentialSet`] is the slice of a user record this crate owns. The
//! record itself (and its storage) belongs to the caller; this type only
//! guarantees the field contracts: secrets are single-use, expire passively,
//! and `password_last_changed` moves exactly when the password does.

use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::error::CoreResult;
use crate::password;

/// Verification codes expire one hour after issuance.
const VERIFICATION_CODE_TTL_SECS: i64 = 60 * 60;
/// Reset tokens expire ten minutes after issuance.
const RESET_TOKEN_TTL_SECS: i64 = 10 * 60;
/// OS-entropy bytes in a raw reset token.
const RESET_TOKEN_BYTES: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSet {
    /// Salted argon2 PHC string. The plaintext is never stored.
    pub password_hash: String,
    /// Stamped by password mutation and nothing else.
    pub password_last_changed: Option<DateTime<Utc>>,
    /// Six-digit email verification code, single-use.
    pub verification_code: Option<String>,
    pub verification_code_expires: Option<DateTime<Utc>>,
    /// SHA-256 hex digest of the raw reset token. The raw token is handed to
    /// the caller at issuance and never persisted, so a copy of stored state
    /// alone cannot forge a valid reset.
    pub reset_password_token: Option<String>,
    pub reset_password_expires: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Creates credentials for a fresh account from a plaintext password.
    pub fn from_password(password: &str, clock: &dyn Clock) -> CoreResult<Self> {
        Ok(Self {
            password_hash: password::hash_password(password)?,
            password_last_changed: Some(clock.now()),
            verification_code: None,
            verification_code_expires: None,
            reset_password_token: None,
            reset_password_expires: None,
        })
    }

    /// Wraps an externally produced hash (seed users from config). No
    /// password mutation happened here, so no timestamp is stamped.
    pub fn from_hash(password_hash: String) -> Self {
        Self {
            password_hash,
            password_last_changed: None,
            verification_code: None,
            verification_code_expires: None,
            reset_password_token: None,
            reset_password_expires: None,
        }
    }

    /// Replaces the stored hash and stamps `password_last_changed`. The prior
    /// hash is discarded; callers never update the timestamp themselves.
    pub fn set_password(&mut self, password: &str, clock: &dyn Clock) -> CoreResult<()> {
        self.password_hash = password::hash_password(password)?;
        self.password_last_changed = Some(clock.now());
        Ok(())
    }

    /// Whether `candidate` matches the stored password. Reports no detail
    /// about why a mismatch occurred.
    pub fn verify_password(&self, candidate: &str) -> CoreResult<bool> {
        password::verify_password(&self.password_hash, candidate)
    }

    /// Issues a fresh six-digit verification code valid for one hour,
    /// invalidating any previously issued code.
    pub fn issue_verification_code(&mut self, clock: &dyn Clock) -> String {
        let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
        let code = format!("{code:06}");

        self.verification_code = Some(code.clone());
        self.verification_code_expires =
            Some(clock.now() + chrono::Duration::seconds(VERIFICATION_CODE_TTL_SECS));

        code
    }

    /// Whether `candidate` is the current, unexpired verification code.
    /// Comparison is exact (case/whitespace-sensitive) and constant-time;
    /// callers normalize input beforehand.
    pub fn verification_code_matches(&self, candidate: &str, clock: &dyn Clock) -> bool {
        secret_matches(
            self.verification_code.as_deref(),
            self.verification_code_expires,
            candidate,
            clock,
        )
    }

    /// Validates and clears the verification code in one step, so a replay
    /// of the same candidate fails afterwards. Returns whether the code was
    /// accepted.
    pub fn consume_verification_code(&mut self, candidate: &str, clock: &dyn Clock) -> bool {
        if !self.verification_code_matches(candidate, clock) {
            return false;
        }

        self.verification_code = None;
        self.verification_code_expires = None;
        true
    }

    /// Issues a reset token valid for ten minutes, returning the raw token
    /// for out-of-band delivery. Only its SHA-256 digest is retained.
    pub fn issue_reset_token(&mut self, clock: &dyn Clock) -> String {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let raw: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

        self.reset_password_token = Some(sha256_hex(&raw));
        self.reset_password_expires =
            Some(clock.now() + chrono::Duration::seconds(RESET_TOKEN_TTL_SECS));

        raw
    }

    /// Validates a raw reset token against the stored digest and clears it
    /// on success. Returns whether the token was accepted.
    pub fn consume_reset_token(&mut self, candidate: &str, clock: &dyn Clock) -> bool {
        let digest = sha256_hex(candidate);
        if !secret_matches(
            self.reset_password_token.as_deref(),
            self.reset_password_expires,
            &digest,
            clock,
        ) {
            return false;
        }

        self.reset_password_token = None;
        self.reset_password_expires = None;
        true
    }
}

/// A stored secret is valid iff present, unexpired (strictly in the future),
/// and exactly equal to the candidate.
fn secret_matches(
    stored: Option<&str>,
    expires: Option<DateTime<Utc>>,
    candidate: &str,
    clock: &dyn Clock,
) -> bool {
    let (Some(stored), Some(expires)) = (stored, expires) else {
        return false;
    };

    expires > clock.now() && constant_time_eq(stored.as_bytes(), candidate.as_bytes())
}

/// Constant-time byte comparison to prevent timing side-channels on code and
/// token checks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
