use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::cart::CartOwner;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    BatchOutcome, CheckoutDetails, CheckoutRequest, ListResult, OrderScope, OrderView, Transitioned,
};
use crate::domain::ports::OrderRepository;
use crate::domain::status::Transition;

pub const MAX_PAGE_SIZE: i64 = 100;

pub struct OrderService<R> {
    repo: R,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Validate the buyer's details, then materialize the cart into an order.
    pub fn create_order(
        &self,
        owner: &CartOwner,
        request: CheckoutRequest,
    ) -> Result<OrderView, DomainError> {
        let details = CheckoutDetails::parse(owner.user_id(), request)?;
        let order = self.repo.create_from_cart(owner, details)?;
        log::info!(
            "order {} created: {} lines, total {}, delivery {} ({})",
            order.id,
            order.lines.len(),
            order.total_amount,
            order.delivery_cost,
            order.delivery_method
        );
        Ok(order)
    }

    pub fn get_order(&self, id: Uuid) -> Result<OrderView, DomainError> {
        self.repo
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found("Order"))
    }

    pub fn list_orders(&self, scope: &OrderScope, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        self.repo
            .list(scope, page.max(1), limit.clamp(1, MAX_PAGE_SIZE))
    }

    fn apply(&self, id: Uuid, transition: &Transition) -> Result<Transitioned, DomainError> {
        match self.repo.transition(id, transition, Utc::now()) {
            Ok(result) => {
                if result.changed {
                    log::info!("order {} is now {}", id, result.order.fulfillment.status);
                } else {
                    log::debug!(
                        "order {} unchanged by {:?}, still {}",
                        id,
                        transition,
                        result.order.fulfillment.status
                    );
                }
                Ok(result)
            }
            Err(e) => {
                if !matches!(e, DomainError::Internal(_)) {
                    log::warn!("order {} rejected {:?}: {}", id, transition, e);
                }
                Err(e)
            }
        }
    }

    fn transition(&self, id: Uuid, transition: &Transition) -> Result<OrderView, DomainError> {
        self.apply(id, transition).map(|result| result.order)
    }

    pub fn mark_paid(&self, id: Uuid) -> Result<OrderView, DomainError> {
        self.transition(id, &Transition::MarkPaid)
    }

    pub fn mark_processing(&self, id: Uuid) -> Result<OrderView, DomainError> {
        self.transition(id, &Transition::MarkProcessing)
    }

    pub fn mark_shipped(&self, id: Uuid, track_number: Option<String>) -> Result<OrderView, DomainError> {
        self.transition(id, &Transition::MarkShipped { track_number })
    }

    pub fn mark_delivered(&self, id: Uuid) -> Result<OrderView, DomainError> {
        self.transition(id, &Transition::MarkDelivered)
    }

    pub fn cancel(&self, id: Uuid) -> Result<OrderView, DomainError> {
        self.transition(id, &Transition::Cancel)
    }

    /// Apply one transition to many orders, each in its own transaction.
    ///
    /// Rejections are collected per order; an infrastructure failure stops
    /// the batch.
    pub fn batch_transition(&self, ids: &[Uuid], transition: &Transition) -> Result<BatchOutcome, DomainError> {
        let mut outcome = BatchOutcome::default();
        let mut seen = HashSet::new();

        for id in ids.iter().copied().filter(|id| seen.insert(*id)) {
            match self.apply(id, transition) {
                Ok(result) if result.changed => outcome.updated.push(id),
                Ok(_) => outcome.unchanged.push(id),
                Err(DomainError::Internal(msg)) => return Err(DomainError::Internal(msg)),
                Err(e) => outcome.rejected.push((id, e.to_string())),
            }
        }

        log::info!(
            "batch {:?}: {} updated, {} unchanged, {} rejected",
            transition,
            outcome.updated.len(),
            outcome.unchanged.len(),
            outcome.rejected.len()
        );
        Ok(outcome)
    }
}
