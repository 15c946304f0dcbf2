//! Security module - Redaction and secret memory handling
//!
//! - Sanitizing tokens and cookies for logs
//! - Secret strings and byte buffers that zero themselves on drop

mod sanitizer;
mod secure_string;

pub use sanitizer::Sanitizer;
pub use secure_string::{SecureBytes, SecureString};
