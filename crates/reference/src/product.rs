use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use stockbook_core::{CategoryId, Channel, Money, SupplierId};

/// Catalog view of a product, as consumed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub sku: String,
    pub name: String,
    /// Public (B2C) tariff.
    pub base_price_b2c: Money,
    /// Trade (B2B) tariff.
    pub base_price_b2b: Money,
    /// Current unit cost, captured on every movement line for margin reporting.
    pub cost: Money,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
    pub active: bool,
}

impl ProductRef {
    /// Base price for a channel, before price rules.
    pub fn base_price(&self, channel: Channel) -> Money {
        match channel {
            Channel::B2B => self.base_price_b2b,
            Channel::B2C => self.base_price_b2c,
        }
    }

    /// Archived products can still be returned or moved, but not sold.
    pub fn can_be_sold(&self) -> bool {
        self.active
    }
}

/// Read-only catalog lookup.
pub trait Catalog: Send + Sync {
    fn product(&self, sku: &str) -> Option<ProductRef>;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn product(&self, sku: &str) -> Option<ProductRef> {
        (**self).product(sku)
    }
}

/// In-memory catalog for tests/dev and for embedding a catalog snapshot.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<String, ProductRef>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = ProductRef>) -> Self {
        let catalog = Self::new();
        for p in products {
            catalog.upsert(p);
        }
        catalog
    }

    pub fn upsert(&self, product: ProductRef) {
        if let Ok(mut map) = self.products.write() {
            map.insert(product.sku.trim().to_string(), product);
        }
    }

    pub fn remove(&self, sku: &str) -> Option<ProductRef> {
        self.products.write().ok()?.remove(sku.trim())
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, sku: &str) -> Option<ProductRef> {
        let map = self.products.read().ok()?;
        map.get(sku.trim()).cloned()
    }
}
