//! Secret Vault adapters

pub mod database;
pub mod hashicorp;
pub mod memory;

pub use database::DatabaseVault;
pub use hashicorp::HashicorpVault;
pub use memory::MemoryVault;
