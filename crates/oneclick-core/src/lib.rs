//! `oneclick-core`: configuration and shared error types for the
//! provisioning scheduler.

pub mod config;
pub mod error;

pub use config::OneclickConfig;
pub use error::{CoreError, Result};
