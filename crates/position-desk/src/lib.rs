//! Client-side synchronization of a single job position aggregate with a remote
//! positions service.

pub mod config;
pub mod error;
pub mod positions;
pub mod telemetry;
