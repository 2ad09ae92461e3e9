//! Reference data the ledger validates against.
//!
//! - `product`: read-only Catalog Reference (owned by the catalog component)
//! - `location`: Location Registry domain types (warehouses and customer retail locations)

pub mod location;
pub mod product;

pub use location::{Location, LocationKind, customer_key};
pub use product::{Catalog, InMemoryCatalog, ProductRef};
