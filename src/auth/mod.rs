//! Token verification for realtime connections.

mod jwt;

pub use jwt::{Claims, JwtSecret};
