use std::str::FromStr;

use bigdecimal::BigDecimal;
use diesel::prelude::*;
use testcontainers::{ContainerAsync, GenericImage};
use uuid::Uuid;

use crate::db::{create_pool, DbPool};
use crate::schema::{categories, products};

#[path = "../../tests/support/postgres.rs"]
mod postgres;

/// Fresh migrated database; keep the container alive for the test's duration.
pub async fn setup_db() -> (ContainerAsync<GenericImage>, DbPool) {
    let (container, url) = postgres::start_postgres().await;
    let pool = create_pool(&url, 4).expect("Failed to create pool");
    crate::run_migrations(&pool).expect("Failed to run migrations");
    (container, pool)
}

pub fn seed_category(pool: &DbPool, slug: &str, parent: Option<Uuid>) -> Uuid {
    let mut conn = pool.get().expect("Failed to get connection");
    let id = Uuid::new_v4();
    diesel::insert_into(categories::table)
        .values((
            categories::id.eq(id),
            categories::name.eq(slug),
            categories::slug.eq(slug),
            categories::parent_id.eq(parent),
        ))
        .execute(&mut conn)
        .expect("insert category failed");
    id
}

pub fn seed_product(pool: &DbPool, category_id: Uuid, slug: &str, price: &str, stock_status: &str) -> Uuid {
    let mut conn = pool.get().expect("Failed to get connection");
    let id = Uuid::new_v4();
    diesel::insert_into(products::table)
        .values((
            products::id.eq(id),
            products::category_id.eq(category_id),
            products::name.eq(slug),
            products::slug.eq(slug),
            products::price.eq(BigDecimal::from_str(price).expect("valid decimal")),
            products::stock_status.eq(stock_status),
        ))
        .execute(&mut conn)
        .expect("insert product failed");
    id
}

pub fn set_price(pool: &DbPool, product_id: Uuid, price: &str) {
    let mut conn = pool.get().expect("Failed to get connection");
    diesel::update(products::table.find(product_id))
        .set(products::price.eq(BigDecimal::from_str(price).expect("valid decimal")))
        .execute(&mut conn)
        .expect("update price failed");
}

pub fn set_description(pool: &DbPool, product_id: Uuid, description: &str) {
    let mut conn = pool.get().expect("Failed to get connection");
    diesel::update(products::table.find(product_id))
        .set(products::description.eq(description))
        .execute(&mut conn)
        .expect("update description failed");
}
