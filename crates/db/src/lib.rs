//! Catalog access for the provisioning steps.
//!
//! [`MongoCatalog`] talks to a live server through the official driver;
//! [`MemoryCatalog`] keeps an in-process catalog with the same duplicate
//! semantics and backs the test suites.

pub mod catalog;
pub mod error;
pub mod memory;
pub mod model;
pub mod mongo;

pub use catalog::{Catalog, CatalogResult};
pub use error::CatalogError;
pub use memory::MemoryCatalog;
pub use model::{IndexDefinition, IndexDirection, IndexKey, RoleGrant, UserRecord};
pub use mongo::{ConnectOptions, MongoCatalog};
