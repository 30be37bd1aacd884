//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::instrument;

use cartwheel_core::{CurrencyCode, Price, ProductId};

use crate::db::{CatalogStore, ProductRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Product};
use crate::routes::MessageQuery;
use crate::state::AppState;

/// Product display data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: String,
    pub image: Option<String>,
}

impl ProductView {
    /// Format a product for display in `currency`.
    #[must_use]
    pub fn new(product: &Product, currency: CurrencyCode) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: Price::new(product.price, currency).to_string(),
            image: (!product.image.is_empty()).then(|| product.image.clone()),
        }
    }
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub user: Option<CurrentUser>,
    pub products: Vec<ProductView>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub user: Option<CurrentUser>,
    pub product: ProductView,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Display the product listing.
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse> {
    let currency = state.config().stripe.currency;
    let products = ProductRepository::new(state.pool())
        .list_products()
        .await?
        .iter()
        .map(|p| ProductView::new(p, currency))
        .collect();

    Ok(ProductsIndexTemplate {
        user: Some(user),
        products,
    })
}

/// Display a single product.
#[instrument(skip(state, user, query))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let product = ProductRepository::new(state.pool())
        .find_product(ProductId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

    Ok(ProductShowTemplate {
        user: Some(user),
        product: ProductView::new(&product, state.config().stripe.currency),
        error: query.error_message(),
        success: query.success_message(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_product_view_formats_price_and_image() {
        let product = Product {
            id: ProductId::new(1),
            name: "The Essentials Basket".to_string(),
            price: Decimal::new(1000, 2),
            description: String::new(),
            image: String::new(),
        };
        let view = ProductView::new(&product, CurrencyCode::USD);
        assert_eq!(view.price, "$10.00");
        assert_eq!(view.image, None);
    }
}
