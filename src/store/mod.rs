//! Ledger and credential persistence behind a minimal key-value capability.

pub mod credentials;
pub mod kv;
pub mod libsql_backend;
pub mod memory;
mod migrations;

pub use credentials::CredentialStore;
pub use kv::KvStore;
pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;
