//! Data Transfer Objects for API requests and responses.

mod error;
mod health;
mod order;

pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus, PoolState};
pub use order::{
    AdminOrderResponse, OrderDetailsResponse, OrderItemRequest, OrderLineResponse,
    OrderOwnerResponse, OrderResponse, PaymentRequest, PlaceOrderRequest, ShippingAddressRequest,
};
