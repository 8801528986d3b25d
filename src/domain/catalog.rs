use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    MadeToOrder,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::MadeToOrder => "made_to_order",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }

    /// Whether the product may be put into a cart at all.
    pub fn can_add_to_cart(self) -> bool {
        self != StockStatus::OutOfStock
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "made_to_order" => Ok(StockStatus::MadeToOrder),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            other => Err(DomainError::validation(format!(
                "unknown stock status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: BigDecimal,
    pub stock_status: StockStatus,
    pub is_featured: bool,
    pub is_new: bool,
    pub views_count: i32,
    pub average_rating: BigDecimal,
}

pub const FEATURED_LIMIT: i64 = 5;
pub const NEW_ARRIVALS_LIMIT: i64 = 6;
pub const SIMILAR_LIMIT: i64 = 6;

/// Sort order of a product listing. Parsed from `price`, `-price`,
/// `created_at`, `-created_at`, `views_count`, `-views_count`,
/// `average_rating` and `-average_rating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductOrdering {
    #[default]
    Newest,
    Oldest,
    Cheapest,
    Priciest,
    LeastViewed,
    MostViewed,
    LowestRated,
    BestRated,
}

impl FromStr for ProductOrdering {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-created_at" => Ok(ProductOrdering::Newest),
            "created_at" => Ok(ProductOrdering::Oldest),
            "price" => Ok(ProductOrdering::Cheapest),
            "-price" => Ok(ProductOrdering::Priciest),
            "views_count" => Ok(ProductOrdering::LeastViewed),
            "-views_count" => Ok(ProductOrdering::MostViewed),
            "average_rating" => Ok(ProductOrdering::LowestRated),
            "-average_rating" => Ok(ProductOrdering::BestRated),
            other => Err(DomainError::validation(format!(
                "cannot order products by '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Slug of a category; products of its whole subtree match.
    pub category: Option<String>,
    pub stock_status: Option<StockStatus>,
    pub price_min: Option<BigDecimal>,
    pub price_max: Option<BigDecimal>,
    pub is_featured: Option<bool>,
    pub is_new: Option<bool>,
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
    pub ordering: ProductOrdering,
    pub limit: Option<i64>,
}

/// Products sold next to `product`: same category, price within 30% either
/// way, never the product itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarQuery {
    pub category_id: Uuid,
    pub exclude: Uuid,
    pub price_min: BigDecimal,
    pub price_max: BigDecimal,
    pub limit: i64,
}

impl SimilarQuery {
    pub fn for_product(product: &ProductView) -> Self {
        let tenth = |n: i32| &product.price * BigDecimal::from(n) / BigDecimal::from(10);
        SimilarQuery {
            category_id: product.category_id,
            exclude: product.id,
            price_min: tenth(7),
            price_max: tenth(13),
            limit: SIMILAR_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTree {
    pub category: Category,
    pub children: Vec<CategoryTree>,
}

/// Arrange categories under their parents, roots first level.
///
/// Siblings are ordered by `sort_order`, then name. Categories caught in a
/// parent cycle have no path to a root and are left out.
pub fn category_forest(categories: Vec<Category>) -> Vec<CategoryTree> {
    let mut by_parent: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for category in categories {
        by_parent.entry(category.parent_id).or_default().push(category);
    }
    grow(None, &mut by_parent)
}

fn grow(parent: Option<Uuid>, by_parent: &mut HashMap<Option<Uuid>, Vec<Category>>) -> Vec<CategoryTree> {
    let mut level = by_parent.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
    level
        .into_iter()
        .map(|category| {
            let children = grow(Some(category.id), by_parent);
            CategoryTree { category, children }
        })
        .collect()
}

/// Collect `root` and every category below it.
///
/// `edges` holds `(category_id, parent_id)` pairs. Cycles in the parent
/// links are tolerated; each category is visited once.
pub fn category_subtree(root: Uuid, edges: &[(Uuid, Option<Uuid>)]) -> Vec<Uuid> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (id, parent) in edges {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*id);
        }
    }

    let mut seen = HashSet::from([root]);
    let mut out = vec![root];
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        for child in children.get(&current).into_iter().flatten() {
            if seen.insert(*child) {
                out.push(*child);
                stack.push(*child);
            }
        }
    }
    out
}
