mod order;
mod product;
mod user;

pub use order::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
};
pub use product::{Product, ProductSummary};
pub use user::{OrderOwner, Principal, Role, User};

/// An order line joined with the product it references.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub item: OrderItem,
    pub product: ProductSummary,
}

/// An order together with its lines, as returned to callers.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}
