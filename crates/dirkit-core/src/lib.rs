//! # dirkit-core
//!
//! Core types shared by the dirkit directory client.
//!
//! ## Modules
//!
//! - [`error`] - Error type carrying paths, result codes and server messages
//! - [`result_code`] - LDAP result code table
//! - [`retry`] - Fixed-interval busy-retry policy
//! - [`transaction`] - Nested transaction manager over a database backend

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result_code;
pub mod retry;
pub mod transaction;

// Re-export commonly used types
pub use error::{Error, Result};
pub use result_code::ResultCode;
