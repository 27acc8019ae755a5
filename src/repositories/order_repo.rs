//! Order repository and the statements it issues.
//!
//! Every statement runs through [`DbPool::run_statement`], either on a caller's
//! transaction connection or on a connection borrowed for that one call.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use jiff_diesel::Timestamp;

use crate::db::{DbConnection, DbPool, MemoryTables, Statement};
use crate::error::AppResult;
use crate::models::{
    NewOrder, NewOrderItem, Order, OrderDetails, OrderItem, OrderLine, OrderOwner, OrderStatus,
    PaymentMethod, PaymentStatus, ProductSummary,
};
use crate::schema::{order_items, orders, products, users};

fn newest_first(a: &Order, b: &Order) -> std::cmp::Ordering {
    b.created_at
        .to_jiff()
        .cmp(&a.created_at.to_jiff())
        .then(b.id.cmp(&a.id))
}

/// `INSERT INTO orders ... RETURNING id`
#[derive(Debug)]
pub struct InsertOrder {
    pub order: NewOrder,
}

#[async_trait]
impl Statement for InsertOrder {
    type Output = i32;

    fn name(&self) -> &'static str {
        "insert_order"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<i32> {
        diesel::insert_into(orders::table)
            .values(&self.order)
            .returning(orders::id)
            .get_result(conn)
            .await
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<i32> {
        tables.insert_order(&self.order)
    }
}

/// `INSERT INTO order_items ... RETURNING id`
#[derive(Debug)]
pub struct InsertOrderItem {
    pub item: NewOrderItem,
}

#[async_trait]
impl Statement for InsertOrderItem {
    type Output = i32;

    fn name(&self) -> &'static str {
        "insert_order_item"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<i32> {
        diesel::insert_into(order_items::table)
            .values(&self.item)
            .returning(order_items::id)
            .get_result(conn)
            .await
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<i32> {
        tables.insert_order_item(&self.item)
    }
}

#[derive(Debug)]
pub struct FindOrder {
    pub order_id: i32,
}

#[async_trait]
impl Statement for FindOrder {
    type Output = Option<Order>;

    fn name(&self) -> &'static str {
        "find_order"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<Option<Order>> {
        orders::table
            .find(self.order_id)
            .select(Order::as_select())
            .first(conn)
            .await
            .optional()
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<Option<Order>> {
        Ok(tables.order(self.order_id).cloned())
    }
}

/// Items of one order joined with their products, in insertion order.
#[derive(Debug)]
pub struct FindOrderLines {
    pub order_id: i32,
}

#[async_trait]
impl Statement for FindOrderLines {
    type Output = Vec<OrderLine>;

    fn name(&self) -> &'static str {
        "find_order_lines"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<Vec<OrderLine>> {
        let rows: Vec<(OrderItem, ProductSummary)> = order_items::table
            .inner_join(products::table)
            .filter(order_items::order_id.eq(self.order_id))
            .order(order_items::id.asc())
            .select((OrderItem::as_select(), ProductSummary::as_select()))
            .load(conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(item, product)| OrderLine { item, product })
            .collect())
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<Vec<OrderLine>> {
        let mut items: Vec<&OrderItem> = tables
            .order_items
            .iter()
            .filter(|item| item.order_id == self.order_id)
            .collect();
        items.sort_by_key(|item| item.id);

        Ok(items
            .into_iter()
            .filter_map(|item| {
                tables.product(item.product_id).map(|product| OrderLine {
                    item: item.clone(),
                    product: ProductSummary::from(product),
                })
            })
            .collect())
    }
}

/// A user's orders, newest first.
#[derive(Debug)]
pub struct ListOrdersByUser {
    pub user_id: i32,
}

#[async_trait]
impl Statement for ListOrdersByUser {
    type Output = Vec<Order>;

    fn name(&self) -> &'static str {
        "list_orders_by_user"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<Vec<Order>> {
        orders::table
            .filter(orders::user_id.eq(self.user_id))
            .order((orders::created_at.desc(), orders::id.desc()))
            .select(Order::as_select())
            .load(conn)
            .await
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<Vec<Order>> {
        let mut found: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| o.user_id == self.user_id)
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found)
    }
}

/// Every order joined with its owner, newest first.
#[derive(Debug)]
pub struct ListAllOrders;

#[async_trait]
impl Statement for ListAllOrders {
    type Output = Vec<(Order, OrderOwner)>;

    fn name(&self) -> &'static str {
        "list_all_orders"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<Vec<(Order, OrderOwner)>> {
        orders::table
            .inner_join(users::table)
            .order((orders::created_at.desc(), orders::id.desc()))
            .select((Order::as_select(), OrderOwner::as_select()))
            .load(conn)
            .await
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<Vec<(Order, OrderOwner)>> {
        let mut found: Vec<&Order> = tables.orders.iter().collect();
        found.sort_by(|a, b| newest_first(a, b));
        Ok(found
            .into_iter()
            .filter_map(|order| {
                tables
                    .user(order.user_id)
                    .map(|user| (order.clone(), OrderOwner::from(user)))
            })
            .collect())
    }
}

/// Marks an unpaid order paid. Affects zero rows when the order is already
/// paid or not owned by `user_id`.
#[derive(Debug)]
pub struct MarkOrderPaid {
    pub order_id: i32,
    pub user_id: i32,
    pub payment_details: String,
    pub paid_at: Timestamp,
}

#[async_trait]
impl Statement for MarkOrderPaid {
    type Output = usize;

    fn name(&self) -> &'static str {
        "mark_order_paid"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<usize> {
        diesel::update(
            orders::table
                .filter(orders::id.eq(self.order_id))
                .filter(orders::user_id.eq(self.user_id))
                .filter(orders::payment_status.ne(PaymentStatus::Paid)),
        )
        .set((
            orders::payment_status.eq(PaymentStatus::Paid),
            orders::status.eq(OrderStatus::Processing),
            orders::payment_details.eq(Some(self.payment_details.as_str())),
            orders::updated_at.eq(self.paid_at),
        ))
        .execute(conn)
        .await
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<usize> {
        match tables.order_mut(self.order_id) {
            Some(order)
                if order.user_id == self.user_id && order.payment_status != PaymentStatus::Paid =>
            {
                order.payment_status = PaymentStatus::Paid;
                order.status = OrderStatus::Processing;
                order.payment_details = Some(self.payment_details.clone());
                order.updated_at = self.paid_at;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

/// Marks an order delivered. Affects zero rows when it is already delivered,
/// or unpaid and not cash-on-delivery.
#[derive(Debug)]
pub struct MarkOrderDelivered {
    pub order_id: i32,
    pub delivered_at: Timestamp,
}

#[async_trait]
impl Statement for MarkOrderDelivered {
    type Output = usize;

    fn name(&self) -> &'static str {
        "mark_order_delivered"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<usize> {
        diesel::update(
            orders::table
                .filter(orders::id.eq(self.order_id))
                .filter(orders::status.ne(OrderStatus::Delivered))
                .filter(
                    orders::payment_status
                        .eq(PaymentStatus::Paid)
                        .or(orders::payment_method.eq(PaymentMethod::CashOnDelivery)),
                ),
        )
        .set((
            orders::status.eq(OrderStatus::Delivered),
            orders::updated_at.eq(self.delivered_at),
        ))
        .execute(conn)
        .await
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<usize> {
        match tables.order_mut(self.order_id) {
            Some(order) if order.can_deliver() => {
                order.status = OrderStatus::Delivered;
                order.updated_at = self.delivered_at;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

/// Order repository holding the connection pool.
///
/// Since `DbPool` (bb8::Pool) internally uses `Arc`, cloning is cheap.
#[derive(Clone)]
pub struct OrderRepository {
    pool: DbPool,
}

impl OrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Inserts the order row on the caller's transaction connection.
    pub async fn insert(&self, order: NewOrder, conn: &mut DbConnection) -> AppResult<i32> {
        self.pool.run_statement(&InsertOrder { order }, Some(conn)).await
    }

    /// Inserts one order line on the caller's transaction connection.
    pub async fn insert_item(&self, item: NewOrderItem, conn: &mut DbConnection) -> AppResult<i32> {
        self.pool.run_statement(&InsertOrderItem { item }, Some(conn)).await
    }

    pub async fn find_by_id(&self, order_id: i32) -> AppResult<Option<Order>> {
        self.pool.run_statement(&FindOrder { order_id }, None).await
    }

    /// Loads an order and its lines on one freshly borrowed connection.
    pub async fn find_details(&self, order_id: i32) -> AppResult<Option<OrderDetails>> {
        let mut conn = self.pool.acquire().await?;
        let Some(order) = self
            .pool
            .run_statement(&FindOrder { order_id }, Some(&mut conn))
            .await?
        else {
            return Ok(None);
        };
        let lines = self
            .pool
            .run_statement(&FindOrderLines { order_id }, Some(&mut conn))
            .await?;
        Ok(Some(OrderDetails { order, lines }))
    }

    pub async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<Order>> {
        self.pool.run_statement(&ListOrdersByUser { user_id }, None).await
    }

    pub async fn list_all(&self) -> AppResult<Vec<(Order, OrderOwner)>> {
        self.pool.run_statement(&ListAllOrders, None).await
    }

    /// Returns the number of rows changed (0 or 1).
    pub async fn mark_paid(
        &self,
        order_id: i32,
        user_id: i32,
        payment_details: String,
        paid_at: Timestamp,
    ) -> AppResult<usize> {
        let statement = MarkOrderPaid {
            order_id,
            user_id,
            payment_details,
            paid_at,
        };
        self.pool.run_statement(&statement, None).await
    }

    /// Returns the number of rows changed (0 or 1).
    pub async fn mark_delivered(&self, order_id: i32, delivered_at: Timestamp) -> AppResult<usize> {
        self.pool
            .run_statement(
                &MarkOrderDelivered {
                    order_id,
                    delivered_at,
                },
                None,
            )
            .await
    }
}
