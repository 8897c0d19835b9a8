//! # Quill (Blog Authentication Service)
//!
//! `quill` is the authentication and session authority of a personal blog
//! platform. It issues 30-minute bearer tokens for the admin account, guards
//! the management API, and records security-relevant actions in an
//! append-only audit log.
//!
//! ## Session Model
//!
//! - **Fixed token lifetime:** tokens expire 30 minutes after issuance. The
//!   server never extends a token; only the client-held session mirror
//!   slides its own advisory expiry.
//! - **Revocation:** logout adds the token to a revocation registry checked
//!   on every verification. The default registry is in-memory and
//!   process-local, so revocation only holds on a single-instance
//!   deployment.
//! - **Lockout:** five failed password attempts lock the account for
//!   15 minutes. The lock is stored in the database and re-evaluated on the
//!   next attempt; there is no background unlock job.
//!
//! ## Error Surface
//!
//! Bearer failures collapse into two coarse categories (`NO_TOKEN`,
//! `INVALID_TOKEN`) and login failures into one, so an external observer
//! cannot distinguish causes. Lockout is surfaced distinctly (`423`) because
//! the legitimate user needs the signal.

pub mod api;
pub mod cli;
pub mod lockout;
pub mod mirror;
pub mod store;
pub mod token;
