//! Apigate kernel: contracts and data model for the API request gateway.
//!
//! - [`gateway`]: request/response model, handler and store traits, result
//!   tree, error taxonomy
//! - [`config`]: multi-format settings loader
//! - [`error`]: startup-time error type

pub mod config;
pub mod error;
pub mod gateway;

pub use error::{KernelError, KernelResult};
