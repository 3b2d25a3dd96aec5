//! Retrieve, filter, sort and rate Arch Linux mirrors from the mirror status
//! service and render them as a pacman mirrorlist.

pub mod cache;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod format;
pub mod rate;
pub mod shutdown;
pub mod sort;
pub mod sources;
pub mod status;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{MirrorStatusError, ProbeError, Result};
pub use status::{MirrorStatus, StatusOptions};
pub use types::{Mirror, StatusSnapshot};
