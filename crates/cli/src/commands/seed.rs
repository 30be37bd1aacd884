//! Seed the catalog with products.
//!
//! Without `--file` the two demo products are inserted. A seed file is a YAML
//! list of products:
//!
//! ```yaml
//! - name: The Essentials Basket
//!   price: "10.00"
//!   description: Bread, milk and other daily essentials.
//!   image: /img/essentials.jpg
//! ```
//!
//! Products whose name is already in the catalog are skipped, so seeding is
//! safe to repeat.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info};

use cartwheel_storefront::db::{self, CatalogStore, ProductRepository, RepositoryError};
use cartwheel_storefront::models::NewProduct;

/// Errors from seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// The demo catalog.
fn default_products() -> Vec<NewProduct> {
    vec![
        NewProduct {
            name: "The Essentials Basket".to_string(),
            price: Decimal::new(1000, 2),
            description: "A carefully curated basket of daily essentials: fresh bread, \
                          creamy milk and the other staples of a weekly shop."
                .to_string(),
            image: String::new(),
        },
        NewProduct {
            name: "The Classic Buttoned Shirt".to_string(),
            price: Decimal::new(2000, 2),
            description: "A stylish, comfortable buttoned shirt with a flattering fit, \
                          equally at home dressed up or down."
                .to_string(),
            image: String::new(),
        },
    ]
}

/// Check a catalog before touching the database.
///
/// Returns one message per problem; an empty list means the catalog is valid.
fn validate_catalog(products: &[NewProduct]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, product) in products.iter().enumerate() {
        let name = product.name.trim();
        if name.is_empty() {
            errors.push(format!("product #{}: name is empty", index + 1));
        } else if !seen.insert(name) {
            errors.push(format!("product #{}: duplicate name {name:?}", index + 1));
        }
        if product.price.is_sign_negative() {
            errors.push(format!("{name:?}: price must not be negative"));
        }
        if product.price.scale() > 2 {
            errors.push(format!("{name:?}: price has more than two decimal places"));
        }
    }

    errors
}

/// Seed catalog products from `file`, or the demo catalog if `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, or if a
/// database operation fails.
pub async fn products(file: Option<&str>) -> Result<(), SeedError> {
    let products = match file {
        Some(file_path) => {
            let path = Path::new(file_path);
            if !path.exists() {
                return Err(SeedError::FileNotFound(file_path.to_string()));
            }
            info!(path = %file_path, "Loading products from file");
            let content = tokio::fs::read_to_string(path).await?;
            serde_yaml::from_str::<Vec<NewProduct>>(&content)?
        }
        None => default_products(),
    };

    info!(products = products.len(), "Parsed catalog");

    // Validate before connecting to the database
    let errors = validate_catalog(&products);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(SeedError::Invalid(errors.len()));
    }

    let database_url =
        super::database_url().ok_or(SeedError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let catalog = ProductRepository::new(&pool);
    let existing: HashSet<String> = catalog
        .list_products()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();

    let mut inserted = 0_usize;
    let mut skipped = 0_usize;
    for product in &products {
        if existing.contains(product.name.trim()) {
            skipped += 1;
            continue;
        }
        let created = catalog.insert_product(product).await?;
        info!(id = %created.id, name = %created.name, "Inserted product");
        inserted += 1;
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped (already exist): {skipped}");

    Ok(())
}
