//! Service layer for business logic operations.
//!
//! Services encapsulate business logic and coordinate between
//! repositories and handlers.

mod auth_service;
pub mod order_draft;
pub mod order_number;
mod order_service;

pub use auth_service::{AuthService, AuthUser};
pub use order_draft::{CartItem, OrderDraft, PlaceOrder, ShippingAddress};
pub use order_number::OrderNumberGenerator;
pub use order_service::{OrderService, PaymentInfo};

use crate::repositories::Repositories;

/// Aggregates all services for convenient access.
///
/// Cloning is cheap since the underlying pool uses `Arc` internally.
#[derive(Clone)]
pub struct Services {
    pub orders: OrderService,
    pub auth: AuthService,
}

impl Services {
    pub fn new(repos: Repositories, jwt_secret: impl Into<String>) -> Self {
        Self {
            orders: OrderService::new(repos.orders),
            auth: AuthService::new(repos.users, jwt_secret),
        }
    }
}
