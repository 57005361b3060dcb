//! Mend library crate
//!
//! Exposes the build-diagnose-fix-apply loop and its collaborators so
//! external tooling can drive the cycle without going through CLI startup.

pub mod buffer;
pub mod build;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod rpc;
pub mod util;
pub mod verify;
