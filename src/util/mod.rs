//! Utility functions shared by the transport and the CLI.
//!
//! - **URL validation**: scheme and host policy checks applied before any fetch
//! - **Text**: sanitizing remote text for terminal output

mod text;
mod url_validator;

pub use text::sanitize_for_terminal;
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};

#[cfg(test)]
pub(crate) mod log_capture;
