pub mod memory;
pub mod postgres;

pub use memory::{InMemoryFingerprintStore, InMemoryTransactionStore};
pub use postgres::{PostgresFingerprintStore, PostgresTransactionStore};
