use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{
    plan_add, validate_quantity, CartLineView, CartOwner, CartView, LineChange, ReservationPolicy,
};
use crate::domain::catalog::StockStatus;
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;
use crate::schema::{cart_lines, carts, products};

use super::models::{CartLineRow, CartRow, NewCartLineRow, NewCartRow};

type LineWithProduct = (CartLineRow, String, BigDecimal, String);

// ── Connection-level queries, shared with checkout ───────────────────────────

fn find_cart(conn: &mut PgConnection, owner: &CartOwner) -> QueryResult<Option<CartRow>> {
    let query = carts::table.select(CartRow::as_select()).into_boxed();
    let query = match owner {
        CartOwner::User(id) => query.filter(carts::user_id.eq(*id)),
        CartOwner::Session(key) => query.filter(carts::session_key.eq(key.clone())),
    };
    query.first(conn).optional()
}

/// Like `find_cart`, but holds the cart row `FOR UPDATE` until the
/// transaction ends. Every write to a cart's lines takes this lock first, so
/// writers and checkout on the same cart run one after another.
pub(crate) fn lock_cart(conn: &mut PgConnection, owner: &CartOwner) -> QueryResult<Option<CartRow>> {
    match owner {
        CartOwner::User(id) => carts::table
            .filter(carts::user_id.eq(*id))
            .select(CartRow::as_select())
            .for_update()
            .first(conn)
            .optional(),
        CartOwner::Session(key) => carts::table
            .filter(carts::session_key.eq(key.as_str()))
            .select(CartRow::as_select())
            .for_update()
            .first(conn)
            .optional(),
    }
}

fn insert_cart(conn: &mut PgConnection, owner: &CartOwner) -> QueryResult<usize> {
    let (user_id, session_key) = match owner {
        CartOwner::User(id) => (Some(*id), None),
        CartOwner::Session(key) => (None, Some(key.clone())),
    };
    // A concurrent request may create the same cart; keep whichever won.
    diesel::insert_into(carts::table)
        .values(&NewCartRow {
            id: Uuid::new_v4(),
            user_id,
            session_key,
        })
        .on_conflict_do_nothing()
        .execute(conn)
}

fn get_or_create_cart(conn: &mut PgConnection, owner: &CartOwner) -> QueryResult<CartRow> {
    if let Some(cart) = find_cart(conn, owner)? {
        return Ok(cart);
    }
    insert_cart(conn, owner)?;
    find_cart(conn, owner)?.ok_or(diesel::result::Error::NotFound)
}

fn lock_or_create_cart(conn: &mut PgConnection, owner: &CartOwner) -> QueryResult<CartRow> {
    if let Some(cart) = lock_cart(conn, owner)? {
        return Ok(cart);
    }
    insert_cart(conn, owner)?;
    lock_cart(conn, owner)?.ok_or(diesel::result::Error::NotFound)
}

pub(crate) fn load_lines(conn: &mut PgConnection, cart_id: Uuid) -> Result<Vec<CartLineView>, DomainError> {
    cart_lines::table
        .inner_join(products::table)
        .filter(cart_lines::cart_id.eq(cart_id))
        .select((
            CartLineRow::as_select(),
            products::name,
            products::price,
            products::stock_status,
        ))
        .order(cart_lines::created_at.asc())
        .load::<LineWithProduct>(conn)?
        .into_iter()
        .map(line_view)
        .collect()
}

pub(crate) fn clear_lines(conn: &mut PgConnection, cart_id: Uuid) -> QueryResult<usize> {
    diesel::delete(cart_lines::table.filter(cart_lines::cart_id.eq(cart_id))).execute(conn)
}

fn load_line(
    conn: &mut PgConnection,
    cart_id: Uuid,
    line_id: Uuid,
) -> Result<Option<CartLineView>, DomainError> {
    cart_lines::table
        .inner_join(products::table)
        .filter(cart_lines::id.eq(line_id))
        .filter(cart_lines::cart_id.eq(cart_id))
        .select((
            CartLineRow::as_select(),
            products::name,
            products::price,
            products::stock_status,
        ))
        .first::<LineWithProduct>(conn)
        .optional()?
        .map(line_view)
        .transpose()
}

fn line_view((line, name, price, stock_status): LineWithProduct) -> Result<CartLineView, DomainError> {
    Ok(CartLineView {
        id: line.id,
        product_id: line.product_id,
        product_name: name,
        unit_price: price,
        stock_status: stock_status.parse()?,
        quantity: line.quantity,
        reserved_until: line.reserved_until,
        created_at: line.created_at,
    })
}

fn touch_cart(conn: &mut PgConnection, cart_id: Uuid) -> QueryResult<usize> {
    diesel::update(carts::table.find(cart_id))
        .set(carts::updated_at.eq(Utc::now()))
        .execute(conn)
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselCartRepository {
    pool: DbPool,
}

impl DieselCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CartRepository for DieselCartRepository {
    fn get_or_create(&self, owner: &CartOwner) -> Result<CartView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = get_or_create_cart(conn, owner)?;
            let lines = load_lines(conn, cart.id)?;
            Ok(CartView {
                id: cart.id,
                lines,
                created_at: cart.created_at,
                updated_at: cart.updated_at,
            })
        })
    }

    fn add_line(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
        policy: ReservationPolicy,
        now: DateTime<Utc>,
    ) -> Result<CartLineView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = lock_or_create_cart(conn, owner)?;

            let stock_status: StockStatus = products::table
                .find(product_id)
                .select(products::stock_status)
                .first::<String>(conn)
                .optional()?
                .ok_or_else(|| DomainError::not_found("Product"))?
                .parse()?;

            let existing = cart_lines::table
                .filter(cart_lines::cart_id.eq(cart.id))
                .filter(cart_lines::product_id.eq(product_id))
                .select((cart_lines::id, cart_lines::quantity))
                .first::<(Uuid, i32)>(conn)
                .optional()?;

            let line_id = match plan_add(stock_status, existing, quantity, &policy, now)? {
                LineChange::Create {
                    quantity,
                    reserved_until,
                } => {
                    let id = Uuid::new_v4();
                    diesel::insert_into(cart_lines::table)
                        .values(&NewCartLineRow {
                            id,
                            cart_id: cart.id,
                            product_id,
                            quantity,
                            reserved_until,
                        })
                        .execute(conn)?;
                    id
                }
                LineChange::Increment { line_id, quantity } => {
                    diesel::update(cart_lines::table.find(line_id))
                        .set((
                            cart_lines::quantity.eq(quantity),
                            cart_lines::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    line_id
                }
            };
            touch_cart(conn, cart.id)?;

            load_line(conn, cart.id, line_id)?
                .ok_or_else(|| DomainError::Internal("cart line vanished after write".to_string()))
        })
    }

    fn update_quantity(
        &self,
        owner: &CartOwner,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineView, DomainError> {
        validate_quantity(quantity)?;
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = lock_cart(conn, owner)?.ok_or_else(|| DomainError::not_found("Cart line"))?;

            let updated = diesel::update(
                cart_lines::table
                    .filter(cart_lines::id.eq(line_id))
                    .filter(cart_lines::cart_id.eq(cart.id)),
            )
            .set((
                cart_lines::quantity.eq(quantity),
                cart_lines::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(DomainError::not_found("Cart line"));
            }
            touch_cart(conn, cart.id)?;

            load_line(conn, cart.id, line_id)?.ok_or_else(|| DomainError::not_found("Cart line"))
        })
    }

    fn remove_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = lock_cart(conn, owner)?.ok_or_else(|| DomainError::not_found("Cart line"))?;

            let deleted = diesel::delete(
                cart_lines::table
                    .filter(cart_lines::id.eq(line_id))
                    .filter(cart_lines::cart_id.eq(cart.id)),
            )
            .execute(conn)?;
            if deleted == 0 {
                return Err(DomainError::not_found("Cart line"));
            }
            touch_cart(conn, cart.id)?;
            Ok(())
        })
    }

    fn clear(&self, owner: &CartOwner) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let Some(cart) = lock_cart(conn, owner)? else {
                return Ok(0);
            };
            let removed = clear_lines(conn, cart.id)?;
            touch_cart(conn, cart.id)?;
            Ok(removed)
        })
    }
}
