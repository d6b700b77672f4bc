//! Worker-side pieces: identity for the claim protocol and the shell
//! job handler used by the node binary.
//!
//! A worker here is not a long-lived process but one claim session —
//! identity is minted per scan, and expiry is judged by comparing the
//! id's embedded timestamp against a threshold, so a crashed or stuck
//! worker needs no explicit deregistration.

pub mod executor;
pub mod ident;

pub use executor::ShellExecutor;
