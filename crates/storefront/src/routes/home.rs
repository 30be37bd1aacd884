//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use tracing::instrument;

use crate::db::{CatalogStore, ProductRepository};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::routes::MessageQuery;
use crate::routes::products::ProductView;
use crate::state::AppState;

/// Number of products featured on the home page.
const FEATURED_PRODUCTS: usize = 4;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
    /// Featured products, shown only to signed-in users.
    pub featured: Vec<ProductView>,
    pub success: Option<String>,
}

/// Display the home page.
#[instrument(skip_all)]
pub async fn home(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let signed_in = user.as_ref().is_some_and(|u| u.two_factor_verified);

    let featured = if signed_in {
        let currency = state.config().stripe.currency;
        ProductRepository::new(state.pool())
            .list_products()
            .await?
            .iter()
            .take(FEATURED_PRODUCTS)
            .map(|p| ProductView::new(p, currency))
            .collect()
    } else {
        Vec::new()
    };

    Ok(HomeTemplate {
        user,
        featured,
        success: query.success_message(),
    })
}
