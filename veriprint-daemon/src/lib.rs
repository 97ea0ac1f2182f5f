//! Daemon internals, exposed as a library so integration tests can
//! drive the service without spawning the binary.

pub mod config;
pub mod error;
pub mod identity;
pub mod ipc;
pub mod ratelimit;
pub mod registrar;
pub mod service;
pub mod sessions;
pub mod signals;
