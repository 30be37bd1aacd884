//! Catalog product types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartwheel_core::ProductId;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in the store currency's standard unit.
    pub price: Decimal,
    pub description: String,
    /// Image path or URL.
    pub image: String,
}

/// A catalog entry to insert, as read from a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}
