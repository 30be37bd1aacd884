//! Cart route handlers.
//!
//! Every mutation is a plain form POST followed by a redirect carrying a
//! message code (see [`super::MessageQuery`]).

use std::collections::{BTreeMap, HashMap};

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use tracing::instrument;

use cartwheel_core::{CartState, CurrencyCode, Price, ProductId};

use crate::db::{OrderRepository, ProductRepository};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::{CartItem, CurrentUser, LineItem};
use crate::routes::MessageQuery;
use crate::services::cart::{CartError, CartService, calculate_total_amount};
use crate::state::AppState;

/// Prefix of the per-line quantity fields posted by the cart form.
const QUANTITY_FIELD_PREFIX: &str = "quantity-";

/// Cart item display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub price: String,
    pub line_price: String,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total: String,
    pub item_count: i64,
}

impl CartView {
    /// Build the view from cart lines, priced at the live product price.
    #[must_use]
    pub fn new(items: &[CartItem], currency: CurrencyCode) -> Self {
        Self {
            items: items
                .iter()
                .map(|item| CartItemView {
                    product_id: item.product.id,
                    name: item.product.name.clone(),
                    quantity: item.order.quantity.get(),
                    price: Price::new(item.unit_price(), currency).to_string(),
                    line_price: Price::new(item.line_total(), currency).to_string(),
                })
                .collect(),
            total: Price::new(calculate_total_amount(items), currency).to_string(),
            item_count: items
                .iter()
                .map(|i| i64::from(i.order.quantity.get()))
                .sum(),
        }
    }
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub user: Option<CurrentUser>,
    pub cart: CartView,
    /// The cart is empty because a batch was just placed.
    pub awaiting_payment: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Pull `quantity-<product id>` fields out of the cart form.
///
/// Other fields (submit buttons) are ignored. Returns `None` if any quantity
/// value is not an integer.
fn parse_quantity_fields(fields: &HashMap<String, String>) -> Option<BTreeMap<ProductId, i64>> {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let id = key.strip_prefix(QUANTITY_FIELD_PREFIX)?.parse::<i32>().ok()?;
            Some((ProductId::new(id), value))
        })
        .map(|(id, value)| value.trim().parse::<i64>().ok().map(|q| (id, q)))
        .collect()
}

/// Display the cart.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());
    let service = CartService::new(&catalog, &orders);

    let items = service.get_cart_items(user.id).await?;
    let awaiting_payment = items.is_empty()
        && service.cart_state(user.id).await? == CartState::Placed;

    Ok(CartTemplate {
        cart: CartView::new(&items, state.config().stripe.currency),
        user: Some(user),
        awaiting_payment,
        error: query.error_message(),
        success: query.success_message(),
    })
}

/// Apply the quantities posted from the cart page.
///
/// Zero removes a line; a negative or non-numeric value rejects the whole
/// update.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Redirect> {
    let Some(quantities) = parse_quantity_fields(&fields) else {
        return Ok(Redirect::to("/cart?error=invalid_quantity"));
    };

    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());

    match CartService::new(&catalog, &orders)
        .update_quantities(user.id, &quantities)
        .await
    {
        Ok(()) => Ok(Redirect::to("/cart?success=cart_updated")),
        Err(CartError::InvalidQuantity { product_id, source }) => {
            tracing::debug!(%product_id, %source, "Cart update rejected");
            Ok(Redirect::to("/cart?error=invalid_quantity"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Add one unit of a product to the cart.
#[instrument(skip(state, user))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let product_id = ProductId::new(id);
    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());

    let order = CartService::new(&catalog, &orders)
        .add_to_cart(user.id, product_id)
        .await?;

    let (product, quantity) = (product_id.to_string(), order.quantity.to_string());
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", product.as_str()), ("quantity", quantity.as_str())]),
    );

    Ok(Redirect::to(&format!("/products/{product_id}?success=added")))
}

/// Remove a line from the cart.
#[instrument(skip(state, user))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());

    CartService::new(&catalog, &orders)
        .remove_from_cart(user.id, ProductId::new(id))
        .await?;

    Ok(Redirect::to("/cart?success=removed"))
}

/// Place every cart line and continue to payment.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Redirect> {
    let catalog = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());

    match CartService::new(&catalog, &orders).place_order(user.id).await {
        Ok(placement) => {
            let placement_id = placement.placement_id.to_string();
            add_breadcrumb(
                "checkout",
                "Order placed",
                Some(&[("placement_id", placement_id.as_str())]),
            );
            Ok(Redirect::to("/checkout?success=placed"))
        }
        Err(CartError::EmptyCart) => Ok(Redirect::to("/cart?error=empty_cart")),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::CatalogStore;
    use crate::db::memory::MemoryStore;
    use crate::models::product::NewProduct;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_quantity_fields_ignores_other_fields() {
        let parsed = parse_quantity_fields(&form(&[
            ("quantity-1", "3"),
            ("quantity-2", " 0 "),
            ("update_cart", "Update Cart"),
        ]))
        .unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&ProductId::new(1)], 3);
        assert_eq!(parsed[&ProductId::new(2)], 0);
    }

    #[test]
    fn test_parse_quantity_fields_keeps_negative_for_service_validation() {
        let parsed = parse_quantity_fields(&form(&[("quantity-4", "-1")])).unwrap();
        assert_eq!(parsed[&ProductId::new(4)], -1);
    }

    #[test]
    fn test_parse_quantity_fields_rejects_non_numeric() {
        assert!(parse_quantity_fields(&form(&[("quantity-1", "two")])).is_none());
    }

    #[test]
    fn test_parse_quantity_fields_skips_malformed_keys() {
        let parsed = parse_quantity_fields(&form(&[("quantity-abc", "2")])).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn test_cart_view_counts_near_max_quantities() {
        let store = MemoryStore::new();
        let user = cartwheel_core::UserId::new(1);
        let mut quantities = BTreeMap::new();
        for name in ["Basket", "Shirt"] {
            let product = store
                .insert_product(&NewProduct {
                    name: name.to_owned(),
                    price: Decimal::new(1000, 2),
                    description: String::new(),
                    image: String::new(),
                })
                .await
                .unwrap();
            quantities.insert(product.id, 2_000_000_000);
        }

        let cart = CartService::new(&store, &store);
        for product_id in quantities.keys() {
            cart.add_to_cart(user, *product_id).await.unwrap();
        }
        cart.update_quantities(user, &quantities).await.unwrap();

        let items = cart.get_cart_items(user).await.unwrap();
        let view = CartView::new(&items, CurrencyCode::USD);
        assert_eq!(view.item_count, 4_000_000_000);
        assert_eq!(view.items.len(), 2);
    }
}
