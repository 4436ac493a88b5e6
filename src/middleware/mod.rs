//! Middleware: request extractors for tokens and app keys, plus response security headers.

pub mod auth;
pub mod security;

pub use auth::{AppKey, TokenUser};
pub use security::with_security_headers;
