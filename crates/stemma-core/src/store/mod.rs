mod redb_store;
mod traits;

pub use redb_store::{RedbStore, CURRENT_SCHEMA_VERSION};
pub use traits::Store;
