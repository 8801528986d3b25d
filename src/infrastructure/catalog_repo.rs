use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::PgTextExpressionMethods;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::catalog::{
    category_subtree, Category, ProductFilter, ProductOrdering, ProductView, SimilarQuery,
};
use crate::domain::errors::DomainError;
use crate::domain::ports::CatalogRepository;
use crate::schema::{categories, products};

use super::models::{CategoryRow, ProductRow};

fn product_view(row: ProductRow) -> Result<ProductView, DomainError> {
    Ok(ProductView {
        id: row.id,
        category_id: row.category_id,
        name: row.name,
        slug: row.slug,
        description: row.description,
        price: row.price,
        stock_status: row.stock_status.parse()?,
        is_featured: row.is_featured,
        is_new: row.is_new,
        views_count: row.views_count,
        average_rating: row.average_rating,
    })
}

/// `%term%` for ILIKE, with the pattern characters in `term` escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Ids of the category with `slug` and all its descendants, or `None` when
/// no such category exists.
fn category_ids(conn: &mut PgConnection, slug: &str) -> QueryResult<Option<Vec<Uuid>>> {
    let root = categories::table
        .filter(categories::slug.eq(slug))
        .select(categories::id)
        .first::<Uuid>(conn)
        .optional()?;
    let Some(root) = root else {
        return Ok(None);
    };

    let edges = categories::table
        .select((categories::id, categories::parent_id))
        .load::<(Uuid, Option<Uuid>)>(conn)?;

    Ok(Some(category_subtree(root, &edges)))
}

pub struct DieselCatalogRepository {
    pool: DbPool,
}

impl DieselCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CatalogRepository for DieselCatalogRepository {
    fn find_product(&self, id: Uuid) -> Result<Option<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;

        products::table
            .find(id)
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(product_view)
            .transpose()
    }

    fn find_by_slug(&self, slug: &str) -> Result<Option<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;

        products::table
            .filter(products::slug.eq(slug))
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(product_view)
            .transpose()
    }

    fn view_product(&self, slug: &str) -> Result<Option<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;

        diesel::update(products::table.filter(products::slug.eq(slug)))
            .set(products::views_count.eq(products::views_count + 1))
            .returning(ProductRow::as_returning())
            .get_result(&mut conn)
            .optional()?
            .map(product_view)
            .transpose()
    }

    fn list_products(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;

        let mut query = products::table
            .select(ProductRow::as_select())
            .into_boxed();

        if let Some(slug) = &filter.category {
            let Some(ids) = category_ids(&mut conn, slug)? else {
                return Ok(Vec::new());
            };
            query = query.filter(products::category_id.eq_any(ids));
        }
        if let Some(status) = filter.stock_status {
            query = query.filter(products::stock_status.eq(status.as_str()));
        }
        if let Some(min) = &filter.price_min {
            query = query.filter(products::price.ge(min.clone()));
        }
        if let Some(max) = &filter.price_max {
            query = query.filter(products::price.le(max.clone()));
        }
        if let Some(featured) = filter.is_featured {
            query = query.filter(products::is_featured.eq(featured));
        }
        if let Some(is_new) = filter.is_new {
            query = query.filter(products::is_new.eq(is_new));
        }
        if let Some(term) = &filter.search {
            let pattern = contains_pattern(term);
            query = query.filter(
                products::name
                    .ilike(pattern.clone())
                    .or(products::description.ilike(pattern)),
            );
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        query = match filter.ordering {
            ProductOrdering::Newest => query.order(products::created_at.desc()),
            ProductOrdering::Oldest => query.order(products::created_at.asc()),
            ProductOrdering::Cheapest => query.order(products::price.asc()),
            ProductOrdering::Priciest => query.order(products::price.desc()),
            ProductOrdering::LeastViewed => query.order(products::views_count.asc()),
            ProductOrdering::MostViewed => query.order(products::views_count.desc()),
            ProductOrdering::LowestRated => query.order(products::average_rating.asc()),
            ProductOrdering::BestRated => query.order(products::average_rating.desc()),
        };

        query
            .then_order_by(products::id.asc())
            .load(&mut conn)?
            .into_iter()
            .map(product_view)
            .collect()
    }

    fn list_similar(&self, query: &SimilarQuery) -> Result<Vec<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;

        products::table
            .filter(products::category_id.eq(query.category_id))
            .filter(products::id.ne(query.exclude))
            .filter(products::price.ge(query.price_min.clone()))
            .filter(products::price.le(query.price_max.clone()))
            .select(ProductRow::as_select())
            .order((products::views_count.desc(), products::id.asc()))
            .limit(query.limit)
            .load(&mut conn)?
            .into_iter()
            .map(product_view)
            .collect()
    }

    fn categories(&self) -> Result<Vec<Category>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = categories::table
            .select(CategoryRow::as_select())
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|row| Category {
                id: row.id,
                name: row.name,
                slug: row.slug,
                parent_id: row.parent_id,
                sort_order: row.sort_order,
            })
            .collect())
    }
}
