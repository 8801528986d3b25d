use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::CartOwner;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    CheckoutDetails, ListResult, OrderDraft, OrderLineView, OrderScope, OrderView, PricedLine,
    Transitioned,
};
use crate::domain::ports::OrderRepository;
use crate::domain::status::{Fulfillment, OrderStatus, Transition};
use crate::schema::{cart_lines, order_lines, order_outbox, orders, products};

use super::cart_repo::{clear_lines, lock_cart};
use super::models::{
    NewOrderLineRow, NewOrderRow, NewOutboxEventRow, OrderLineRow, OrderRow, OrderStatusChangeset,
};

const AGGREGATE_TYPE: &str = "Order";

// ── Connection-level queries ─────────────────────────────────────────────────

fn priced_cart_lines(conn: &mut PgConnection, cart_id: Uuid) -> QueryResult<Vec<PricedLine>> {
    let rows = cart_lines::table
        .inner_join(products::table)
        .filter(cart_lines::cart_id.eq(cart_id))
        .select((cart_lines::product_id, cart_lines::quantity, products::price))
        .order(cart_lines::created_at.asc())
        .load::<(Uuid, i32, BigDecimal)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(product_id, quantity, unit_price)| PricedLine {
            product_id,
            quantity,
            unit_price,
        })
        .collect())
}

fn insert_draft(conn: &mut PgConnection, draft: &OrderDraft) -> QueryResult<Uuid> {
    let order_id = Uuid::new_v4();
    let details = &draft.details;

    diesel::insert_into(orders::table)
        .values(&NewOrderRow {
            id: order_id,
            user_id: details.user_id,
            name: details.name.clone(),
            email: details.email.clone(),
            phone: details.phone.clone(),
            delivery_method: details.delivery_method.as_str().to_string(),
            delivery_address: details.delivery_address.clone(),
            delivery_cost: draft.delivery_cost.clone(),
            total_amount: draft.total_amount.clone(),
            discount_amount: draft.discount_amount.clone(),
            promo_code: details.promo_code.clone(),
            comment: details.comment.clone(),
            status: OrderStatus::Pending.as_str().to_string(),
        })
        .execute(conn)?;

    let new_lines: Vec<NewOrderLineRow> = draft
        .lines
        .iter()
        .map(|l| NewOrderLineRow {
            id: Uuid::new_v4(),
            order_id,
            product_id: l.product_id,
            quantity: l.quantity,
            unit_price: l.unit_price.clone(),
        })
        .collect();
    diesel::insert_into(order_lines::table)
        .values(&new_lines)
        .execute(conn)?;

    Ok(order_id)
}

fn write_event(
    conn: &mut PgConnection,
    order_id: Uuid,
    event_type: &str,
    payload: serde_json::Value,
) -> QueryResult<usize> {
    diesel::insert_into(order_outbox::table)
        .values(&NewOutboxEventRow {
            id: Uuid::new_v4(),
            aggregate_type: AGGREGATE_TYPE.to_string(),
            aggregate_id: order_id.to_string(),
            event_type: event_type.to_string(),
            payload,
        })
        .execute(conn)
}

fn scoped_orders(scope: &OrderScope) -> orders::BoxedQuery<'static, Pg> {
    let query = orders::table.into_boxed();
    match scope {
        OrderScope::User(id) => query.filter(orders::user_id.eq(*id)),
        OrderScope::GuestEmail(email) => query
            .filter(orders::email.eq(email.clone()))
            .filter(orders::user_id.is_null()),
    }
}

fn load_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderView>, DomainError> {
    let order = orders::table
        .filter(orders::id.eq(id))
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;

    let Some(order) = order else {
        return Ok(None);
    };

    let lines = OrderLineRow::belonging_to(&order)
        .select(OrderLineRow::as_select())
        .order(order_lines::created_at.asc())
        .load(conn)?;

    order_view(order, lines).map(Some)
}

fn order_view(order: OrderRow, lines: Vec<OrderLineRow>) -> Result<OrderView, DomainError> {
    Ok(OrderView {
        id: order.id,
        user_id: order.user_id,
        name: order.name,
        email: order.email,
        phone: order.phone,
        delivery_method: order.delivery_method,
        delivery_address: order.delivery_address,
        delivery_cost: order.delivery_cost,
        total_amount: order.total_amount,
        discount_amount: order.discount_amount,
        promo_code: order.promo_code,
        comment: order.comment,
        fulfillment: Fulfillment {
            status: order.status.parse()?,
            track_number: order.track_number,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
        },
        created_at: order.created_at,
        updated_at: order.updated_at,
        lines: lines
            .into_iter()
            .map(|l| OrderLineView {
                id: l.id,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect(),
    })
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderRepository for DieselOrderRepository {
    fn create_from_cart(
        &self,
        owner: &CartOwner,
        details: CheckoutDetails,
    ) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // 1. Snapshot the cart at current prices; the lock keeps
            //    concurrent cart writes out until the lines are cleared
            let cart = lock_cart(conn, owner)?;
            let lines = match &cart {
                Some(cart) => priced_cart_lines(conn, cart.id)?,
                None => Vec::new(),
            };
            let draft = OrderDraft::from_cart(details, lines)?;

            // 2. Insert the order and its lines
            let order_id = insert_draft(conn, &draft)?;

            // 3. Outbox event in the same transaction
            let line_payloads: Vec<serde_json::Value> = draft
                .lines
                .iter()
                .map(|l| {
                    json!({
                        "product_id": l.product_id,
                        "quantity": l.quantity,
                        "unit_price": l.unit_price.to_string()
                    })
                })
                .collect();
            write_event(
                conn,
                order_id,
                "OrderCreated",
                json!({
                    "order_id": order_id,
                    "user_id": draft.details.user_id,
                    "email": draft.details.email,
                    "status": OrderStatus::Pending.as_str(),
                    "total_amount": draft.total_amount.to_string(),
                    "delivery_cost": draft.delivery_cost.to_string(),
                    "lines": line_payloads
                }),
            )?;

            // 4. Empty the cart
            if let Some(cart) = cart {
                clear_lines(conn, cart.id)?;
            }

            load_order(conn, order_id)?
                .ok_or_else(|| DomainError::Internal("order vanished after insert".to_string()))
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;
        load_order(&mut conn, id)
    }

    fn list(&self, scope: &OrderScope, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let mut conn = self.pool.get()?;

        let offset = page.saturating_sub(1).saturating_mul(limit);
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = scoped_orders(scope).count().get_result(conn)?;

            let rows = scoped_orders(scope)
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            let lines = OrderLineRow::belonging_to(&rows)
                .select(OrderLineRow::as_select())
                .order(order_lines::created_at.asc())
                .load(conn)?;

            let items = lines
                .grouped_by(&rows)
                .into_iter()
                .zip(rows)
                .map(|(lines, order)| order_view(order, lines))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ListResult { items, total })
        })
    }

    fn transition(
        &self,
        id: Uuid,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let order = orders::table
                .filter(orders::id.eq(id))
                .select(OrderRow::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .ok_or_else(|| DomainError::not_found("Order"))?;

            let previous: OrderStatus = order.status.parse()?;
            let mut fulfillment = Fulfillment {
                status: previous,
                track_number: order.track_number,
                paid_at: order.paid_at,
                shipped_at: order.shipped_at,
                delivered_at: order.delivered_at,
            };

            let changed = fulfillment.apply(transition, now)?;
            if changed {
                diesel::update(orders::table.find(id))
                    .set(&OrderStatusChangeset {
                        status: fulfillment.status.as_str().to_string(),
                        track_number: fulfillment.track_number.clone(),
                        paid_at: fulfillment.paid_at,
                        shipped_at: fulfillment.shipped_at,
                        delivered_at: fulfillment.delivered_at,
                        updated_at: now,
                    })
                    .execute(conn)?;

                write_event(
                    conn,
                    id,
                    "OrderStatusChanged",
                    json!({
                        "order_id": id,
                        "from": previous.as_str(),
                        "to": fulfillment.status.as_str(),
                        "track_number": fulfillment.track_number,
                        "changed_at": now,
                    }),
                )?;
            }

            let order = load_order(conn, id)?.ok_or_else(|| DomainError::not_found("Order"))?;
            Ok(Transitioned { order, changed })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use bigdecimal::BigDecimal;
    use chrono::{Duration, Utc};
    use diesel::prelude::*;
    use uuid::Uuid;

    use super::DieselOrderRepository;
    use crate::domain::cart::{CartOwner, ReservationPolicy};
    use crate::domain::errors::DomainError;
    use crate::domain::order::{CheckoutDetails, DeliveryMethod, OrderScope};
    use crate::domain::ports::{CartRepository, OrderRepository};
    use crate::domain::status::{OrderStatus, Transition};
    use crate::infrastructure::cart_repo::DieselCartRepository;
    use crate::infrastructure::models::OutboxEventRow;
    use crate::infrastructure::test_support::{seed_category, seed_product, set_price, setup_db};
    use crate::schema::{order_outbox, orders};

    fn details(user_id: Option<Uuid>, method: DeliveryMethod) -> CheckoutDetails {
        CheckoutDetails {
            user_id,
            name: "Ivan Petrov".to_string(),
            email: "ivan@example.ru".to_string(),
            phone: "+79123456789".to_string(),
            delivery_method: method,
            delivery_address: "Moscow, Tverskaya 1".to_string(),
            comment: String::new(),
            promo_code: String::new(),
        }
    }

    fn events_for(pool: &crate::db::DbPool, order_id: Uuid) -> Vec<OutboxEventRow> {
        let mut conn = pool.get().expect("Failed to get connection");
        order_outbox::table
            .filter(order_outbox::aggregate_id.eq(order_id.to_string()))
            .order(order_outbox::created_at.asc())
            .select(OutboxEventRow::as_select())
            .load(&mut conn)
            .expect("query failed")
    }

    #[tokio::test]
    async fn checkout_snapshots_cart_and_clears_it() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "knives", None);
        let finka = seed_product(&pool, category, "finka", "1000.00", "in_stock");
        let puukko = seed_product(&pool, category, "puukko", "500.00", "made_to_order");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let user = Uuid::new_v4();
        let owner = CartOwner::User(user);
        let now = Utc::now();
        carts
            .add_line(&owner, finka, 2, ReservationPolicy::default(), now)
            .expect("add failed");
        carts
            .add_line(&owner, puukko, 1, ReservationPolicy::default(), now)
            .expect("add failed");
        let cart_total = carts.get_or_create(&owner).expect("get failed").total();

        let order = repo
            .create_from_cart(&owner, details(Some(user), DeliveryMethod::CourierMoscow))
            .expect("checkout failed");

        assert_eq!(order.total_amount, cart_total);
        assert_eq!(order.total_amount, BigDecimal::from(2500));
        assert_eq!(order.final_amount(), BigDecimal::from(3000));
        assert_eq!(order.items_total(), order.total_amount);
        assert_eq!(order.fulfillment.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 2);
        assert!(carts.get_or_create(&owner).expect("get failed").lines.is_empty());

        let events = events_for(&pool, order.id);
        assert_eq!(events.len(), 1, "exactly one outbox event per new order");
        assert_eq!(events[0].aggregate_type, "Order");
        assert_eq!(events[0].event_type, "OrderCreated");
    }

    #[tokio::test]
    async fn order_lines_keep_price_at_order_time() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "axes", None);
        let axe = seed_product(&pool, category, "taiga-axe", "4200.00", "in_stock");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let owner = CartOwner::Session("sess-price".to_string());
        carts
            .add_line(&owner, axe, 1, ReservationPolicy::default(), Utc::now())
            .expect("add failed");

        let order = repo
            .create_from_cart(&owner, details(None, DeliveryMethod::Pickup))
            .expect("checkout failed");
        set_price(&pool, axe, "9999.00");

        let reloaded = repo
            .find_by_id(order.id)
            .expect("find failed")
            .expect("order should exist");
        assert_eq!(reloaded.lines[0].unit_price, BigDecimal::from(4200));
        assert_eq!(reloaded.delivery_cost, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn empty_cart_checkout_creates_nothing() {
        let (_container, pool) = setup_db().await;
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let owner = CartOwner::Session("sess-empty".to_string());
        carts.get_or_create(&owner).expect("get failed");

        let err = repo
            .create_from_cart(&owner, details(None, DeliveryMethod::Pickup))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = repo
            .create_from_cart(
                &CartOwner::Session("no-cart".to_string()),
                details(None, DeliveryMethod::Pickup),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut conn = pool.get().expect("Failed to get connection");
        let count: i64 = orders::table.count().get_result(&mut conn).expect("count failed");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn transitions_persist_and_reject_illegal_moves() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "knives", None);
        let product = seed_product(&pool, category, "bowie", "2000.00", "in_stock");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let owner = CartOwner::User(Uuid::new_v4());
        carts
            .add_line(&owner, product, 1, ReservationPolicy::default(), Utc::now())
            .expect("add failed");
        let order = repo
            .create_from_cart(&owner, details(owner.user_id(), DeliveryMethod::RussianPost))
            .expect("checkout failed");

        let paid_at = Utc::now();
        let paid = repo
            .transition(order.id, &Transition::MarkPaid, paid_at)
            .expect("mark paid failed");
        assert!(paid.changed);
        let paid = paid.order;
        assert_eq!(paid.fulfillment.status, OrderStatus::Paid);

        let again = repo
            .transition(order.id, &Transition::MarkPaid, paid_at + Duration::hours(2))
            .expect("repeat mark paid failed");
        assert!(!again.changed);
        assert_eq!(again.order.fulfillment.paid_at, paid.fulfillment.paid_at);

        let shipped = repo
            .transition(
                order.id,
                &Transition::MarkShipped {
                    track_number: Some("RA123456789RU".to_string()),
                },
                Utc::now(),
            )
            .expect("mark shipped failed")
            .order;
        assert_eq!(shipped.fulfillment.track_number, "RA123456789RU");
        assert!(shipped.fulfillment.shipped_at.is_some());

        let err = repo
            .transition(order.id, &Transition::Cancel, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled
            }
        ));

        let reloaded = repo
            .find_by_id(order.id)
            .expect("find failed")
            .expect("order should exist");
        assert_eq!(reloaded.fulfillment.status, OrderStatus::Shipped);

        let event_types: Vec<String> = events_for(&pool, order.id)
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            event_types,
            vec!["OrderCreated", "OrderStatusChanged", "OrderStatusChanged"]
        );
    }

    #[tokio::test]
    async fn transition_on_unknown_order_is_not_found() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOrderRepository::new(pool);

        let err = repo
            .transition(Uuid::new_v4(), &Transition::MarkPaid, Utc::now())
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_scopes_by_user_and_guest_email() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "knives", None);
        let product = seed_product(&pool, category, "kiridashi", "800.00", "in_stock");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);
        let user = Uuid::new_v4();
        let member = CartOwner::User(user);
        let guest = CartOwner::Session("guest".to_string());

        for _ in 0..3 {
            carts
                .add_line(&member, product, 1, ReservationPolicy::default(), Utc::now())
                .expect("add failed");
            repo.create_from_cart(&member, details(Some(user), DeliveryMethod::Pickup))
                .expect("checkout failed");
        }
        carts
            .add_line(&guest, product, 2, ReservationPolicy::default(), Utc::now())
            .expect("add failed");
        repo.create_from_cart(&guest, details(None, DeliveryMethod::Pickup))
            .expect("checkout failed");

        let page1 = repo.list(&OrderScope::User(user), 1, 2).expect("list failed");
        assert_eq!(page1.total, 3);
        assert_eq!(page1.items.len(), 2);
        assert!(page1.items.iter().all(|o| o.lines.len() == 1));

        let page2 = repo.list(&OrderScope::User(user), 2, 2).expect("list failed");
        assert_eq!(page2.items.len(), 1);

        let guests = repo
            .list(&OrderScope::GuestEmail("ivan@example.ru".to_string()), 1, 20)
            .expect("list failed");
        assert_eq!(guests.total, 1);
        assert_eq!(guests.items[0].lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "knives", None);
        let product = seed_product(&pool, category, "kukri", "900.00", "in_stock");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);
        let user = Uuid::new_v4();
        let owner = CartOwner::User(user);
        carts
            .add_line(&owner, product, 1, ReservationPolicy::default(), Utc::now())
            .expect("add failed");
        repo.create_from_cart(&owner, details(Some(user), DeliveryMethod::Pickup))
            .expect("checkout failed");

        let page = repo
            .list(&OrderScope::User(user), i64::MAX, 100)
            .expect("list failed");

        assert_eq!(page.total, 1);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn line_added_during_checkout_is_ordered_or_kept() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "knives", None);
        let first = seed_product(&pool, category, "finka", "1000.00", "in_stock");
        let late = seed_product(&pool, category, "puukko", "500.00", "in_stock");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);

        for round in 0..10 {
            let user = Uuid::new_v4();
            let owner = CartOwner::User(user);
            carts
                .add_line(&owner, first, 1, ReservationPolicy::default(), Utc::now())
                .expect("add failed");

            let barrier = Barrier::new(2);
            let (carts_ref, repo_ref, owner_ref, barrier) = (&carts, &repo, &owner, &barrier);
            let (order, added) = thread::scope(|scope| {
                let checkout = scope.spawn(move || {
                    barrier.wait();
                    repo_ref.create_from_cart(owner_ref, details(Some(user), DeliveryMethod::Pickup))
                });
                let add = scope.spawn(move || {
                    barrier.wait();
                    carts_ref.add_line(owner_ref, late, 1, ReservationPolicy::default(), Utc::now())
                });
                (
                    checkout.join().expect("checkout thread panicked"),
                    add.join().expect("add thread panicked"),
                )
            });
            let order = order.expect("checkout failed");
            added.expect("concurrent add failed");

            let ordered = order.lines.iter().any(|l| l.product_id == late);
            let in_cart = carts
                .get_or_create(&owner)
                .expect("get failed")
                .lines
                .iter()
                .any(|l| l.product_id == late);
            assert!(ordered != in_cart, "round {round}: line must be in exactly one place");
            assert!(order.lines.iter().any(|l| l.product_id == first));
        }
    }

    #[tokio::test]
    async fn checkout_total_beyond_the_amount_column_is_rejected() {
        let (_container, pool) = setup_db().await;
        let category = seed_category(&pool, "collectibles", None);
        let relic = seed_product(&pool, category, "relic", "99999999.00", "made_to_order");
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let owner = CartOwner::Session("sess-big".to_string());
        carts
            .add_line(&owner, relic, 2, ReservationPolicy::default(), Utc::now())
            .expect("add failed");

        let err = repo
            .create_from_cart(&owner, details(None, DeliveryMethod::Pickup))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(carts.get_or_create(&owner).expect("get failed").lines.len(), 1);
        let mut conn = pool.get().expect("Failed to get connection");
        let count: i64 = orders::table.count().get_result(&mut conn).expect("count failed");
        assert_eq!(count, 0);
    }
}
