//! Grimoire Server Library
//!
//! Async service facade over the `grimoire-cache` engine, plus the command
//! definitions for the `grimoire` binary.

pub mod cli;
pub mod error;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use service::ContentService;
