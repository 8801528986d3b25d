use crate::domain::catalog::{
    category_forest, CategoryTree, ProductFilter, ProductOrdering, ProductView, SimilarQuery,
    FEATURED_LIMIT, NEW_ARRIVALS_LIMIT,
};
use crate::domain::errors::DomainError;
use crate::domain::ports::CatalogRepository;

pub struct CatalogService<R> {
    repo: R,
}

impl<R: CatalogRepository> CatalogService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Product page lookup; every successful call counts as one view.
    pub fn view(&self, slug: &str) -> Result<ProductView, DomainError> {
        self.repo
            .view_product(slug)?
            .ok_or_else(|| DomainError::not_found("Product"))
    }

    pub fn list(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, DomainError> {
        if let (Some(min), Some(max)) = (&filter.price_min, &filter.price_max) {
            if min > max {
                return Err(DomainError::validation("price_min must not exceed price_max"));
            }
        }
        self.repo.list_products(filter)
    }

    /// Slider on the home page.
    pub fn featured(&self) -> Result<Vec<ProductView>, DomainError> {
        self.repo.list_products(&ProductFilter {
            is_featured: Some(true),
            limit: Some(FEATURED_LIMIT),
            ..ProductFilter::default()
        })
    }

    pub fn new_arrivals(&self) -> Result<Vec<ProductView>, DomainError> {
        self.repo.list_products(&ProductFilter {
            is_new: Some(true),
            ordering: ProductOrdering::Newest,
            limit: Some(NEW_ARRIVALS_LIMIT),
            ..ProductFilter::default()
        })
    }

    /// Products close to `slug` in category and price. Does not count a view.
    pub fn similar(&self, slug: &str) -> Result<Vec<ProductView>, DomainError> {
        let product = self
            .repo
            .find_by_slug(slug)?
            .ok_or_else(|| DomainError::not_found("Product"))?;
        self.repo.list_similar(&SimilarQuery::for_product(&product))
    }

    /// Root categories with their subcategories nested below.
    pub fn categories(&self) -> Result<Vec<CategoryTree>, DomainError> {
        Ok(category_forest(self.repo.categories()?))
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use uuid::Uuid;

    use super::*;
    use crate::domain::catalog::{Category, StockStatus, SIMILAR_LIMIT};
    use crate::domain::ports::MockCatalogRepository;

    fn product(slug: &str, price: i32) -> ProductView {
        ProductView {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: slug.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            price: BigDecimal::from(price),
            stock_status: StockStatus::InStock,
            is_featured: false,
            is_new: false,
            views_count: 0,
            average_rating: BigDecimal::from(0),
        }
    }

    #[test]
    fn unknown_slug_is_not_found() {
        let mut repo = MockCatalogRepository::new();
        repo.expect_view_product()
            .withf(|slug| slug == "missing")
            .returning(|_| Ok(None));
        let service = CatalogService::new(repo);

        assert!(matches!(service.view("missing"), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn inverted_price_range_is_rejected() {
        let mut repo = MockCatalogRepository::new();
        repo.expect_list_products().never();
        let service = CatalogService::new(repo);

        let filter = ProductFilter {
            price_min: Some(BigDecimal::from(500)),
            price_max: Some(BigDecimal::from(100)),
            ..ProductFilter::default()
        };

        assert!(matches!(service.list(&filter), Err(DomainError::Validation(_))));
    }

    #[test]
    fn home_page_listings_are_capped() {
        let mut repo = MockCatalogRepository::new();
        repo.expect_list_products()
            .withf(|f| f.is_featured == Some(true) && f.limit == Some(FEATURED_LIMIT))
            .times(1)
            .returning(|_| Ok(vec![]));
        repo.expect_list_products()
            .withf(|f| {
                f.is_new == Some(true)
                    && f.ordering == ProductOrdering::Newest
                    && f.limit == Some(NEW_ARRIVALS_LIMIT)
            })
            .times(1)
            .returning(|_| Ok(vec![]));
        let service = CatalogService::new(repo);

        service.featured().unwrap();
        service.new_arrivals().unwrap();
    }

    #[test]
    fn similar_looks_up_without_counting_a_view() {
        let base = product("finka", 1000);
        let expected = SimilarQuery::for_product(&base);
        let mut repo = MockCatalogRepository::new();
        repo.expect_view_product().never();
        repo.expect_find_by_slug()
            .withf(|slug| slug == "finka")
            .returning(move |_| Ok(Some(base.clone())));
        repo.expect_list_similar()
            .withf(move |q| *q == expected && q.limit == SIMILAR_LIMIT)
            .times(1)
            .returning(|_| Ok(vec![product("puukko", 1100)]));
        let service = CatalogService::new(repo);

        let similar = service.similar("finka").unwrap();

        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].slug, "puukko");
    }

    #[test]
    fn similar_for_unknown_slug_is_not_found() {
        let mut repo = MockCatalogRepository::new();
        repo.expect_find_by_slug().returning(|_| Ok(None));
        repo.expect_list_similar().never();
        let service = CatalogService::new(repo);

        assert!(matches!(service.similar("nope"), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn categories_come_back_as_a_tree() {
        let root = Uuid::new_v4();
        let mut repo = MockCatalogRepository::new();
        repo.expect_categories().returning(move || {
            Ok(vec![
                Category {
                    id: Uuid::new_v4(),
                    name: "Hunting".to_string(),
                    slug: "hunting".to_string(),
                    parent_id: Some(root),
                    sort_order: 0,
                },
                Category {
                    id: root,
                    name: "Knives".to_string(),
                    slug: "knives".to_string(),
                    parent_id: None,
                    sort_order: 0,
                },
            ])
        });
        let service = CatalogService::new(repo);

        let tree = service.categories().unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].category.slug, "knives");
        assert_eq!(tree[0].children[0].category.slug, "hunting");
    }
}
