use std::str::FromStr;

use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::reviews::ReviewResponse;
use super::{money, run, AppState};
use crate::domain::catalog::{CategoryTree, ProductFilter, ProductOrdering, ProductView, StockStatus};
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListProductsParams {
    /// Category slug; products of its subcategories are included.
    pub category: Option<String>,
    pub stock_status: Option<StockStatus>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub is_featured: Option<bool>,
    pub is_new: Option<bool>,
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
    /// price, created_at, views_count or average_rating; prefix `-` for
    /// descending. Defaults to -created_at.
    pub ordering: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    #[schema(no_recursion)]
    pub children: Vec<CategoryResponse>,
}

impl From<CategoryTree> for CategoryResponse {
    fn from(t: CategoryTree) -> Self {
        CategoryResponse {
            id: t.category.id,
            name: t.category.name,
            slug: t.category.slug,
            parent_id: t.category.parent_id,
            sort_order: t.category.sort_order,
            children: t.children.into_iter().map(CategoryResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: String,
    pub stock_status: StockStatus,
    pub is_featured: bool,
    pub is_new: bool,
    pub views_count: i32,
    pub average_rating: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetailResponse {
    #[serde(flatten)]
    pub product: ProductResponse,
    /// Approved reviews, newest first.
    pub reviews: Vec<ReviewResponse>,
}

impl From<ProductView> for ProductResponse {
    fn from(p: ProductView) -> Self {
        ProductResponse {
            id: p.id,
            category_id: p.category_id,
            name: p.name,
            slug: p.slug,
            description: p.description,
            price: money(&p.price),
            stock_status: p.stock_status,
            is_featured: p.is_featured,
            is_new: p.is_new,
            views_count: p.views_count,
            average_rating: money(&p.average_rating),
        }
    }
}

fn price(name: &str, raw: Option<String>) -> Result<Option<BigDecimal>, AppError> {
    raw.map(|value| {
        BigDecimal::from_str(value.trim())
            .map_err(|_| AppError::BadRequest(format!("{name} must be a decimal number")))
    })
    .transpose()
}

fn product_list(products: Vec<ProductView>) -> HttpResponse {
    HttpResponse::Ok().json(
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    )
}

/// GET /products
#[utoipa::path(
    get,
    path = "/products",
    params(
        ("category" = Option<String>, Query, description = "Category slug"),
        ("stock_status" = Option<StockStatus>, Query, description = "Availability"),
        ("price_min" = Option<String>, Query, description = "Lowest price, inclusive"),
        ("price_max" = Option<String>, Query, description = "Highest price, inclusive"),
        ("is_featured" = Option<bool>, Query, description = "Featured products only"),
        ("is_new" = Option<bool>, Query, description = "New arrivals only"),
        ("search" = Option<String>, Query, description = "Text in name or description"),
        ("ordering" = Option<String>, Query, description = "Sort field, `-` prefix for descending"),
    ),
    responses(
        (status = 200, description = "Matching products, newest first by default", body = Vec<ProductResponse>),
        (status = 400, description = "Malformed filter"),
    ),
    tag = "catalog"
)]
pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<ListProductsParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let ordering = match params.ordering.as_deref().map(str::trim) {
        None | Some("") => ProductOrdering::default(),
        Some(field) => field.parse::<ProductOrdering>()?,
    };
    let filter = ProductFilter {
        category: params.category.filter(|c| !c.trim().is_empty()),
        stock_status: params.stock_status,
        price_min: price("price_min", params.price_min)?,
        price_max: price("price_max", params.price_max)?,
        is_featured: params.is_featured,
        is_new: params.is_new,
        search: params
            .search
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
        ordering,
        limit: None,
    };

    let products = run(state, move |s| s.catalog.list(&filter)).await?;
    Ok(product_list(products))
}

/// GET /products/featured
#[utoipa::path(
    get,
    path = "/products/featured",
    responses(
        (status = 200, description = "Up to 5 featured products", body = Vec<ProductResponse>),
    ),
    tag = "catalog"
)]
pub async fn featured_products(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = run(state, |s| s.catalog.featured()).await?;
    Ok(product_list(products))
}

/// GET /products/new
#[utoipa::path(
    get,
    path = "/products/new",
    responses(
        (status = 200, description = "Up to 6 newest products flagged as new", body = Vec<ProductResponse>),
    ),
    tag = "catalog"
)]
pub async fn new_products(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = run(state, |s| s.catalog.new_arrivals()).await?;
    Ok(product_list(products))
}

/// GET /products/{slug}/similar
///
/// Same category, price within 30% either way, most viewed first.
#[utoipa::path(
    get,
    path = "/products/{slug}/similar",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Up to 6 similar products", body = Vec<ProductResponse>),
        (status = 404, description = "Product not found"),
    ),
    tag = "catalog"
)]
pub async fn similar_products(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let slug = path.into_inner();
    let products = run(state, move |s| s.catalog.similar(&slug)).await?;
    Ok(product_list(products))
}

/// GET /categories
///
/// Root categories with nested subcategories.
#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "Category tree", body = Vec<CategoryResponse>),
    ),
    tag = "catalog"
)]
pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let tree = run(state, |s| s.catalog.categories()).await?;
    Ok(HttpResponse::Ok().json(
        tree.into_iter()
            .map(CategoryResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// GET /products/{slug}
///
/// Product page with its approved reviews. Each call counts one view.
#[utoipa::path(
    get,
    path = "/products/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product found", body = ProductDetailResponse),
        (status = 404, description = "Product not found"),
    ),
    tag = "catalog"
)]
pub async fn get_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let slug = path.into_inner();
    let (product, reviews) = run(state, move |s| {
        let product = s.catalog.view(&slug)?;
        let reviews = s.reviews.list_for_product(product.id)?;
        Ok((product, reviews))
    })
    .await?;

    Ok(HttpResponse::Ok().json(ProductDetailResponse {
        product: ProductResponse::from(product),
        reviews: reviews.into_iter().map(ReviewResponse::from).collect(),
    }))
}
