use chrono::Utc;
use uuid::Uuid;

use crate::domain::cart::{validate_quantity, CartLineView, CartOwner, CartView, ReservationPolicy};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;

pub struct CartService<R> {
    repo: R,
    policy: ReservationPolicy,
}

impl<R: CartRepository> CartService<R> {
    pub fn new(repo: R, policy: ReservationPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn cart(&self, owner: &CartOwner) -> Result<CartView, DomainError> {
        self.repo.get_or_create(owner)
    }

    pub fn add(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineView, DomainError> {
        validate_quantity(quantity)?;
        let line = self
            .repo
            .add_line(owner, product_id, quantity, self.policy, Utc::now())?;
        log::info!(
            "cart line {} now holds {} x product {}",
            line.id,
            line.quantity,
            product_id
        );
        Ok(line)
    }

    pub fn update_quantity(
        &self,
        owner: &CartOwner,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineView, DomainError> {
        validate_quantity(quantity)?;
        self.repo.update_quantity(owner, line_id, quantity)
    }

    pub fn remove(&self, owner: &CartOwner, line_id: Uuid) -> Result<(), DomainError> {
        self.repo.remove_line(owner, line_id)
    }

    pub fn clear(&self, owner: &CartOwner) -> Result<usize, DomainError> {
        let removed = self.repo.clear(owner)?;
        log::debug!("cleared {} cart lines", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use chrono::Duration;
    use mockall::predicate::eq;

    use super::*;
    use crate::domain::catalog::StockStatus;
    use crate::domain::ports::MockCartRepository;

    fn line(product_id: Uuid, quantity: i32) -> CartLineView {
        CartLineView {
            id: Uuid::new_v4(),
            product_id,
            product_name: "Finka".to_string(),
            unit_price: BigDecimal::from(1000),
            stock_status: StockStatus::InStock,
            quantity,
            reserved_until: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_passes_configured_hold_to_repository() {
        let product_id = Uuid::new_v4();
        let mut repo = MockCartRepository::new();
        repo.expect_add_line()
            .withf(move |_, p, q, policy, now| {
                *p == product_id
                    && *q == 2
                    && policy.reservation_for(StockStatus::InStock, *now)
                        == Some(*now + Duration::hours(2))
            })
            .times(1)
            .returning(move |_, p, q, _, _| Ok(line(p, q)));

        let service = CartService::new(repo, ReservationPolicy::hours(2));
        let added = service
            .add(&CartOwner::User(Uuid::new_v4()), product_id, 2)
            .unwrap();

        assert_eq!(added.quantity, 2);
    }

    #[test]
    fn zero_quantity_never_reaches_repository() {
        let mut repo = MockCartRepository::new();
        repo.expect_add_line().never();
        repo.expect_update_quantity().never();
        let service = CartService::new(repo, ReservationPolicy::default());
        let owner = CartOwner::Session("s".to_string());

        assert!(matches!(
            service.add(&owner, Uuid::new_v4(), 0),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.update_quantity(&owner, Uuid::new_v4(), 0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn remove_propagates_not_found() {
        let line_id = Uuid::new_v4();
        let mut repo = MockCartRepository::new();
        repo.expect_remove_line()
            .with(mockall::predicate::always(), eq(line_id))
            .returning(|_, _| Err(DomainError::not_found("Cart line")));
        let service = CartService::new(repo, ReservationPolicy::default());

        let err = service
            .remove(&CartOwner::User(Uuid::new_v4()), line_id)
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
