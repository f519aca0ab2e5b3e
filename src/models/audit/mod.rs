mod memory;
mod queries;
mod types;

pub use memory::InMemoryAuditLog;
pub use queries::PgAuditLog;
pub use types::*;
