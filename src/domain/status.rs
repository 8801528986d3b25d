//! Order status lifecycle.
//!
//! Orders progress `pending -> paid -> processing -> shipped -> delivered`.
//! Steps may be skipped, except that an order can only be delivered once it
//! has shipped. `cancelled` is reachable from every state before `shipped`.
//! `delivered` and `cancelled` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable label shown to buyers and staff.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Awaiting payment",
            OrderStatus::Paid => "Paid",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Position along the forward progression. `None` for `cancelled`.
    fn rank(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Paid => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Processing
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::Internal(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// A status change requested by staff or a payment webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Transition {
    MarkPaid,
    MarkProcessing,
    MarkShipped {
        #[serde(default)]
        track_number: Option<String>,
    },
    MarkDelivered,
    Cancel,
}

impl Transition {
    pub fn target(&self) -> OrderStatus {
        match self {
            Transition::MarkPaid => OrderStatus::Paid,
            Transition::MarkProcessing => OrderStatus::Processing,
            Transition::MarkShipped { .. } => OrderStatus::Shipped,
            Transition::MarkDelivered => OrderStatus::Delivered,
            Transition::Cancel => OrderStatus::Cancelled,
        }
    }
}

/// The mutable part of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    pub status: OrderStatus,
    pub track_number: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Fulfillment {
    pub fn new() -> Self {
        Self {
            status: OrderStatus::Pending,
            track_number: String::new(),
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
        }
    }

    /// Apply `transition` at `now`.
    ///
    /// Returns `Ok(true)` when anything was modified and `Ok(false)` when the
    /// order already was in the requested status. Timestamps are stamped once,
    /// on first entry into their status.
    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let from = self.status;
        let to = transition.target();
        let rejected = DomainError::InvalidTransition { from, to };

        if to == OrderStatus::Cancelled {
            if !from.can_cancel() {
                return Err(rejected);
            }
            self.status = OrderStatus::Cancelled;
            return Ok(true);
        }

        if from == to {
            return Ok(self.update_track_number(transition));
        }

        if from.is_terminal() {
            return Err(rejected);
        }
        let moves_forward = match (from.rank(), to.rank()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        };
        if !moves_forward || (to == OrderStatus::Delivered && from != OrderStatus::Shipped) {
            return Err(rejected);
        }

        self.status = to;
        match to {
            OrderStatus::Paid => {
                self.paid_at.get_or_insert(now);
            }
            OrderStatus::Shipped => {
                self.shipped_at.get_or_insert(now);
                self.update_track_number(transition);
            }
            OrderStatus::Delivered => {
                self.delivered_at.get_or_insert(now);
            }
            _ => {}
        }
        Ok(true)
    }

    fn update_track_number(&mut self, transition: &Transition) -> bool {
        let Transition::MarkShipped {
            track_number: Some(track),
        } = transition
        else {
            return false;
        };
        let track = track.trim();
        if track.is_empty() || track == self.track_number {
            return false;
        }
        self.track_number = track.to_string();
        true
    }
}

impl Default for Fulfillment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(status: OrderStatus) -> Fulfillment {
        Fulfillment {
            status,
            ..Fulfillment::new()
        }
    }

    fn shipped(track: &str) -> Transition {
        Transition::MarkShipped {
            track_number: Some(track.to_string()),
        }
    }

    #[test]
    fn full_forward_progression_stamps_each_timestamp() {
        let now = Utc::now();
        let mut f = Fulfillment::new();

        assert!(f.apply(&Transition::MarkPaid, now).unwrap());
        assert!(f.apply(&Transition::MarkProcessing, now).unwrap());
        assert!(f.apply(&shipped("RU123"), now).unwrap());
        assert!(f.apply(&Transition::MarkDelivered, now).unwrap());

        assert_eq!(f.status, OrderStatus::Delivered);
        assert_eq!(f.paid_at, Some(now));
        assert_eq!(f.shipped_at, Some(now));
        assert_eq!(f.delivered_at, Some(now));
        assert_eq!(f.track_number, "RU123");
    }

    #[test]
    fn repeated_mark_paid_keeps_first_stamp() {
        let first = Utc::now();
        let later = first + Duration::minutes(5);
        let mut f = Fulfillment::new();

        f.apply(&Transition::MarkPaid, first).unwrap();
        let changed = f.apply(&Transition::MarkPaid, later).unwrap();

        assert!(!changed);
        assert_eq!(f.status, OrderStatus::Paid);
        assert_eq!(f.paid_at, Some(first));
    }

    #[test]
    fn cancel_allowed_before_shipping_and_keeps_timestamps() {
        let paid_at = Utc::now();
        for status in [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Processing] {
            let mut f = Fulfillment {
                paid_at: Some(paid_at),
                ..at(status)
            };
            assert!(f.apply(&Transition::Cancel, Utc::now()).unwrap());
            assert_eq!(f.status, OrderStatus::Cancelled);
            assert_eq!(f.paid_at, Some(paid_at));
            assert_eq!(f.shipped_at, None);
        }
    }

    #[test]
    fn cancel_rejected_once_shipped_or_finished() {
        for status in [OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled] {
            let mut f = at(status);
            let err = f.apply(&Transition::Cancel, Utc::now()).unwrap_err();
            assert!(matches!(
                err,
                DomainError::InvalidTransition { from, to: OrderStatus::Cancelled } if from == status
            ));
            assert_eq!(f.status, status);
        }
    }

    #[test]
    fn backwards_moves_are_rejected() {
        let mut f = at(OrderStatus::Processing);
        assert!(f.apply(&Transition::MarkPaid, Utc::now()).is_err());
        assert_eq!(f.status, OrderStatus::Processing);
    }

    #[test]
    fn delivery_requires_shipment() {
        let mut f = at(OrderStatus::Paid);
        assert!(f.apply(&Transition::MarkDelivered, Utc::now()).is_err());
    }

    #[test]
    fn shipping_may_skip_processing() {
        let mut f = at(OrderStatus::Paid);
        f.apply(&shipped(""), Utc::now()).unwrap();
        assert_eq!(f.status, OrderStatus::Shipped);
        assert_eq!(f.track_number, "");
    }

    #[test]
    fn cancelled_orders_cannot_be_revived() {
        let mut f = at(OrderStatus::Cancelled);
        assert!(f.apply(&Transition::MarkPaid, Utc::now()).is_err());
    }

    #[test]
    fn reshipping_updates_track_number_without_restamping() {
        let first = Utc::now();
        let mut f = Fulfillment::new();
        f.apply(&shipped("A1"), first).unwrap();

        let changed = f.apply(&shipped("B2"), first + Duration::hours(1)).unwrap();

        assert!(changed);
        assert_eq!(f.track_number, "B2");
        assert_eq!(f.shipped_at, Some(first));
    }

    #[test]
    fn status_parses_from_its_string_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("made_up".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn transition_deserializes_from_tagged_json() {
        let t: Transition =
            serde_json::from_str(r#"{"action":"mark_shipped","track_number":"X9"}"#).unwrap();
        assert_eq!(t, shipped("X9"));
        let t: Transition = serde_json::from_str(r#"{"action":"cancel"}"#).unwrap();
        assert_eq!(t, Transition::Cancel);
    }
}
