//! Repository layer for data access operations.

mod order_repo;
mod user_repo;

pub use order_repo::{
    FindOrder, FindOrderLines, InsertOrder, InsertOrderItem, ListAllOrders, ListOrdersByUser,
    MarkOrderDelivered, MarkOrderPaid, OrderRepository,
};
pub use user_repo::{FindActiveUser, UserRepository};

use crate::db::DbPool;

/// Aggregates all repositories for convenient access.
///
/// Since `DbPool` uses `Arc` internally, cloning is cheap.
#[derive(Clone)]
pub struct Repositories {
    pub orders: OrderRepository,
    pub users: UserRepository,
}

impl Repositories {
    pub fn new(pool: DbPool) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            users: UserRepository::new(pool),
        }
    }
}
