use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::catalog::StockStatus;
use super::errors::DomainError;

const MAX_SESSION_KEY_LEN: usize = 40;
/// Upper bound for a single cart line.
pub const MAX_LINE_QUANTITY: i32 = 999;

/// Identity owning a cart: a registered user or an anonymous session, never
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

impl CartOwner {
    pub fn session(key: &str) -> Result<Self, DomainError> {
        let key = key.trim();
        if key.is_empty() || key.len() > MAX_SESSION_KEY_LEN {
            return Err(DomainError::validation(format!(
                "session key must be 1 to {MAX_SESSION_KEY_LEN} characters"
            )));
        }
        Ok(CartOwner::Session(key.to_string()))
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }
}

/// Advisory hold placed on in-stock products when they enter a cart.
#[derive(Debug, Clone, Copy)]
pub struct ReservationPolicy {
    hold: Duration,
}

impl ReservationPolicy {
    pub const DEFAULT_HOLD_HOURS: i64 = 24;
    /// One year.
    pub const MAX_HOLD_HOURS: i64 = 24 * 365;

    pub fn new(hold: Duration) -> Self {
        Self { hold }
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    /// Expiry for a newly created line; only in-stock products are reserved.
    pub fn reservation_for(&self, stock_status: StockStatus, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (stock_status == StockStatus::InStock).then(|| now + self.hold)
    }
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self::hours(Self::DEFAULT_HOLD_HOURS)
    }
}

pub fn is_reserved(reserved_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    reserved_until.is_some_and(|until| now < until)
}

/// Whole seconds left on a reservation, 0 once it has lapsed.
pub fn seconds_left(reserved_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match reserved_until {
        Some(until) if now < until => (until - now).num_seconds(),
        _ => 0,
    }
}

#[derive(Debug, Clone)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: BigDecimal,
    pub stock_status: StockStatus,
    pub quantity: i32,
    pub reserved_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CartLineView {
    pub fn total_price(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct CartView {
    pub id: Uuid,
    pub lines: Vec<CartLineView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartView {
    /// Sum of line totals at current product prices.
    pub fn total(&self) -> BigDecimal {
        self.lines
            .iter()
            .fold(BigDecimal::from(0), |acc, l| acc + l.total_price())
    }

    pub fn items_count(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }
}

pub fn validate_quantity(quantity: i32) -> Result<(), DomainError> {
    if quantity < 1 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(DomainError::validation(format!(
            "quantity must be at most {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

/// Write needed to put `quantity` more of a product into a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
    Create {
        quantity: i32,
        reserved_until: Option<DateTime<Utc>>,
    },
    Increment {
        line_id: Uuid,
        quantity: i32,
    },
}

/// Decide how adding a product changes the cart.
///
/// `existing` is the current `(line_id, quantity)` for the product, if any.
/// An existing line keeps its reservation.
pub fn plan_add(
    stock_status: StockStatus,
    existing: Option<(Uuid, i32)>,
    quantity: i32,
    policy: &ReservationPolicy,
    now: DateTime<Utc>,
) -> Result<LineChange, DomainError> {
    validate_quantity(quantity)?;
    if !stock_status.can_add_to_cart() {
        return Err(DomainError::validation("product is out of stock"));
    }
    match existing {
        Some((line_id, current)) => {
            let quantity = current
                .checked_add(quantity)
                .ok_or_else(|| DomainError::validation("quantity is too large"))?;
            validate_quantity(quantity)?;
            Ok(LineChange::Increment { line_id, quantity })
        }
        None => Ok(LineChange::Create {
            quantity,
            reserved_until: policy.reservation_for(stock_status, now),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn line(price: &str, quantity: i32) -> CartLineView {
        CartLineView {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Yakut knife".to_string(),
            unit_price: BigDecimal::from_str(price).unwrap(),
            stock_status: StockStatus::InStock,
            quantity,
            reserved_until: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reservation_only_for_in_stock_products() {
        let policy = ReservationPolicy::default();
        let now = Utc::now();

        assert_eq!(
            policy.reservation_for(StockStatus::InStock, now),
            Some(now + Duration::hours(24))
        );
        assert_eq!(policy.reservation_for(StockStatus::MadeToOrder, now), None);
        assert_eq!(policy.reservation_for(StockStatus::OutOfStock, now), None);
    }

    #[test]
    fn reservation_lapses_at_expiry() {
        let now = Utc::now();
        let until = now + Duration::seconds(90);

        assert!(is_reserved(Some(until), now));
        assert_eq!(seconds_left(Some(until), now), 90);
        assert!(!is_reserved(Some(until), until));
        assert_eq!(seconds_left(Some(until), until + Duration::seconds(1)), 0);
        assert!(!is_reserved(None, now));
        assert_eq!(seconds_left(None, now), 0);
    }

    #[test]
    fn cart_total_sums_line_totals() {
        let cart = CartView {
            id: Uuid::new_v4(),
            lines: vec![line("1000.00", 2), line("500.00", 1)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(cart.total(), BigDecimal::from(2500));
        assert_eq!(cart.items_count(), 3);
    }

    #[test]
    fn empty_cart_totals_zero() {
        let cart = CartView {
            id: Uuid::new_v4(),
            lines: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(cart.total(), BigDecimal::from(0));
        assert_eq!(cart.items_count(), 0);
    }

    #[test]
    fn quantity_below_one_is_rejected() {
        assert!(validate_quantity(1).is_ok());
        assert!(matches!(validate_quantity(0), Err(DomainError::Validation(_))));
        assert!(matches!(validate_quantity(-3), Err(DomainError::Validation(_))));
    }

    #[test]
    fn quantity_above_the_line_limit_is_rejected() {
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(
            validate_quantity(MAX_LINE_QUANTITY + 1),
            Err(DomainError::Validation(_))
        ));
        assert!(validate_quantity(i32::MAX).is_err());
    }

    #[test]
    fn increment_cannot_push_a_line_past_the_limit() {
        let line_id = Uuid::new_v4();
        let policy = ReservationPolicy::default();
        let now = Utc::now();

        let change = plan_add(StockStatus::InStock, Some((line_id, 990)), 9, &policy, now).unwrap();
        assert_eq!(change, LineChange::Increment { line_id, quantity: MAX_LINE_QUANTITY });

        let err = plan_add(StockStatus::InStock, Some((line_id, 990)), 10, &policy, now).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn adding_new_in_stock_product_reserves_it() {
        let now = Utc::now();
        let change = plan_add(StockStatus::InStock, None, 2, &ReservationPolicy::hours(24), now).unwrap();
        assert_eq!(
            change,
            LineChange::Create {
                quantity: 2,
                reserved_until: Some(now + Duration::hours(24)),
            }
        );
    }

    #[test]
    fn made_to_order_products_are_added_without_reservation() {
        let now = Utc::now();
        let change = plan_add(StockStatus::MadeToOrder, None, 1, &ReservationPolicy::default(), now).unwrap();
        assert_eq!(
            change,
            LineChange::Create {
                quantity: 1,
                reserved_until: None,
            }
        );
    }

    #[test]
    fn adding_existing_product_increments_its_line() {
        let line_id = Uuid::new_v4();
        let change = plan_add(
            StockStatus::InStock,
            Some((line_id, 3)),
            2,
            &ReservationPolicy::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(change, LineChange::Increment { line_id, quantity: 5 });
    }

    #[test]
    fn out_of_stock_products_cannot_be_added() {
        let err = plan_add(StockStatus::OutOfStock, None, 1, &ReservationPolicy::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("out of stock")));
    }

    #[test]
    fn session_key_must_fit_the_column() {
        assert_eq!(
            CartOwner::session(" abc ").unwrap(),
            CartOwner::Session("abc".to_string())
        );
        assert!(CartOwner::session("").is_err());
        assert!(CartOwner::session(&"k".repeat(41)).is_err());
    }
}
