//! User directory: the store that owns user records and their presence fields.

mod directory;
mod memory;
mod pool;
mod postgres;

pub use directory::UserDirectory;
pub use memory::MemoryUserDirectory;
pub use pool::{create_pool, DbPool};
pub use postgres::PgUserDirectory;
