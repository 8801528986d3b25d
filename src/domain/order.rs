use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::errors::DomainError;
use super::status::Fulfillment;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;
const MAX_PHONE_LEN: usize = 20;
const MAX_PROMO_LEN: usize = 50;
/// Order amounts are stored as NUMERIC(10,2).
const ORDER_TOTAL_LIMIT: i64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    CourierMoscow,
    CdekPickup,
    RussianPost,
    Pickup,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMethod::CourierMoscow => "courier_moscow",
            DeliveryMethod::CdekPickup => "cdek_pickup",
            DeliveryMethod::RussianPost => "russian_post",
            DeliveryMethod::Pickup => "pickup",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeliveryMethod::CourierMoscow => "Courier within Moscow",
            DeliveryMethod::CdekPickup => "CDEK to pickup point",
            DeliveryMethod::RussianPost => "Russian Post",
            DeliveryMethod::Pickup => "Self pickup",
        }
    }

    pub fn requires_address(self) -> bool {
        self != DeliveryMethod::Pickup
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "courier_moscow" => Ok(DeliveryMethod::CourierMoscow),
            "cdek_pickup" => Ok(DeliveryMethod::CdekPickup),
            "russian_post" => Ok(DeliveryMethod::RussianPost),
            "pickup" => Ok(DeliveryMethod::Pickup),
            other => Err(DomainError::validation(format!(
                "unknown delivery method '{other}'"
            ))),
        }
    }
}

/// Delivery cost by method code. Codes outside the table cost nothing, so
/// callers must validate the method before relying on the price.
pub fn delivery_cost(method: &str) -> BigDecimal {
    let cost: i32 = match method {
        "courier_moscow" => 500,
        "cdek_pickup" => 350,
        "russian_post" => 400,
        _ => 0,
    };
    BigDecimal::from(cost)
}

/// Unvalidated checkout input as submitted by the buyer.
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub delivery_method: String,
    pub delivery_address: Option<String>,
    pub comment: Option<String>,
    pub promo_code: Option<String>,
}

/// Contact and delivery snapshot that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutDetails {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: String,
    pub comment: String,
    pub promo_code: String,
}

impl CheckoutDetails {
    pub fn parse(user_id: Option<Uuid>, req: CheckoutRequest) -> Result<Self, DomainError> {
        let name = req.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }

        let email = req.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(DomainError::validation("enter a valid email address"));
        }

        let phone = req.phone.trim().to_string();
        if phone.chars().count() > MAX_PHONE_LEN || !is_valid_phone(&phone) {
            return Err(DomainError::validation("enter a valid phone number"));
        }

        let delivery_method: DeliveryMethod = req.delivery_method.trim().parse()?;
        let delivery_address = req
            .delivery_address
            .map(|a| a.trim().to_string())
            .unwrap_or_default();
        if delivery_method.requires_address() && delivery_address.is_empty() {
            return Err(DomainError::validation(
                "delivery_address is required for this delivery method",
            ));
        }

        let promo_code = req
            .promo_code
            .map(|p| p.trim().to_string())
            .unwrap_or_default();
        if promo_code.chars().count() > MAX_PROMO_LEN {
            return Err(DomainError::validation("promo code is too long"));
        }

        Ok(Self {
            user_id,
            name,
            email,
            phone,
            delivery_method,
            delivery_address,
            comment: req.comment.map(|c| c.trim().to_string()).unwrap_or_default(),
            promo_code,
        })
    }
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Russian phone numbers: optional `+`, optional leading `7`, ten digits.
/// Separators such as spaces, dashes and brackets are ignored.
fn is_valid_phone(phone: &str) -> bool {
    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match digits.len() {
        10 => true,
        11 => digits.starts_with('7'),
        _ => false,
    }
}

/// A cart line priced at the current product price, as read inside the
/// checkout transaction.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

/// Everything needed to insert an order, computed before any write.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub details: CheckoutDetails,
    pub delivery_cost: BigDecimal,
    pub total_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub lines: Vec<PricedLine>,
}

impl OrderDraft {
    /// Snapshot `lines` into a draft order. An empty cart cannot be ordered.
    pub fn from_cart(details: CheckoutDetails, lines: Vec<PricedLine>) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("cart is empty"));
        }
        let total_amount = lines.iter().fold(BigDecimal::from(0), |acc, l| {
            acc + &l.unit_price * BigDecimal::from(l.quantity)
        });
        if total_amount >= BigDecimal::from(ORDER_TOTAL_LIMIT) {
            return Err(DomainError::validation(format!(
                "order total must be below {ORDER_TOTAL_LIMIT}"
            )));
        }
        // Promo codes are recorded but not yet priced.
        let discount_amount = BigDecimal::from(0);

        Ok(Self {
            delivery_cost: delivery_cost(details.delivery_method.as_str()),
            details,
            total_amount,
            discount_amount,
            lines,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

impl OrderLineView {
    pub fn total_price(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub delivery_method: String,
    pub delivery_address: String,
    pub delivery_cost: BigDecimal,
    pub total_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub promo_code: String,
    pub comment: String,
    pub fulfillment: Fulfillment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
}

impl OrderView {
    /// Amount payable: goods plus delivery minus discount.
    pub fn final_amount(&self) -> BigDecimal {
        &self.total_amount + &self.delivery_cost - &self.discount_amount
    }

    /// Sum of the captured line prices.
    pub fn items_total(&self) -> BigDecimal {
        self.lines
            .iter()
            .fold(BigDecimal::from(0), |acc, l| acc + l.total_price())
    }
}

/// Whose orders to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderScope {
    User(Uuid),
    /// Guest orders placed with this email.
    GuestEmail(String),
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<OrderView>,
    pub total: i64,
}

/// An order after a transition was applied to it. `changed` is false when the
/// order already satisfied the transition and nothing was written.
#[derive(Debug, Clone)]
pub struct Transitioned {
    pub order: OrderView,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub updated: Vec<Uuid>,
    /// Orders already in the requested state.
    pub unchanged: Vec<Uuid>,
    pub rejected: Vec<(Uuid, String)>,
}
