//! Security subsystem.
//!
//! # Responsibilities
//! - Cookie integrity (signing outgoing values, verifying incoming ones)
//!
//! # Design Decisions
//! - Verification failures are reported as `None`, never as errors, so
//!   forged cookies are dropped without surfacing to application code
//! - Signature comparison is constant-time (via `hmac`)

pub mod cookie_signing;

pub use cookie_signing::CookieSigner;
