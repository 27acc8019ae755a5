//! In-process store used in place of PostgreSQL.
//!
//! [`MemoryStore`] is a `bb8::ManageConnection`, so it plugs into the same
//! pool, executor and transaction coordinator as the real database. A
//! transaction holds the store's write lock from `BEGIN` until it commits or
//! rolls back, and rollback restores the snapshot taken at `BEGIN`. A
//! connection dropped while its transaction is open is reported broken to the
//! pool and restores the snapshot when it is destroyed.
//!
//! The store also checks the constraints the migrations declare (unique,
//! foreign-key and check constraints, `VARCHAR(32)` lengths) and coerces
//! money to `NUMERIC(12, 2)` the way PostgreSQL does. Failures can be
//! injected into statements, commits and rollbacks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError, QueryResult};
use jiff_diesel::ToDiesel;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::Statement;
use crate::models::{NewOrder, NewOrderItem, Order, OrderItem, Product, Role, User};

/// Errors raised by the in-memory connection manager.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("in-memory store is unreachable")]
    Unreachable,
}

/// Rows held by the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub users: Vec<User>,
    pub products: Vec<Product>,
    pub orders: Vec<Order>,
    pub order_items: Vec<OrderItem>,
    last_user_id: i32,
    last_product_id: i32,
    last_order_id: i32,
    last_item_id: i32,
}

impl MemoryTables {
    pub fn user(&self, id: i32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn product(&self, id: i32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn order(&self, id: i32) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn order_mut(&mut self, id: i32) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    /// Inserts an order, enforcing the column types, `orders_total_amount_check`,
    /// `orders_order_number_key` and `orders_user_id_fkey`.
    pub fn insert_order(&mut self, new: &NewOrder) -> QueryResult<i32> {
        varchar(&new.order_number, 32)?;
        varchar(&new.phone, 32)?;
        let total_amount = numeric_12_2(&new.total_amount)?;
        if total_amount <= BigDecimal::zero() {
            return Err(violation(
                DatabaseErrorKind::CheckViolation,
                "orders",
                "orders_total_amount_check",
                "new row for relation \"orders\" violates check constraint \"orders_total_amount_check\"",
                format!("Failing row contains total_amount {total_amount}."),
            ));
        }
        if self
            .orders
            .iter()
            .any(|o| o.order_number == new.order_number)
        {
            return Err(violation(
                DatabaseErrorKind::UniqueViolation,
                "orders",
                "orders_order_number_key",
                "duplicate key value violates unique constraint \"orders_order_number_key\"",
                format!("Key (order_number)=({}) already exists.", new.order_number),
            ));
        }
        if self.user(new.user_id).is_none() {
            return Err(violation(
                DatabaseErrorKind::ForeignKeyViolation,
                "orders",
                "orders_user_id_fkey",
                "insert or update on table \"orders\" violates foreign key constraint \"orders_user_id_fkey\"",
                format!("Key (user_id)=({}) is not present in table \"users\".", new.user_id),
            ));
        }

        self.last_order_id += 1;
        let id = self.last_order_id;
        self.orders.push(Order {
            id,
            order_number: new.order_number.clone(),
            user_id: new.user_id,
            total_amount,
            shipping_address: new.shipping_address.clone(),
            phone: new.phone.clone(),
            status: new.status,
            payment_method: new.payment_method,
            payment_status: new.payment_status,
            payment_details: None,
            notes: new.notes.clone(),
            created_at: new.created_at,
            updated_at: new.updated_at,
        });
        Ok(id)
    }

    /// Inserts an order line, enforcing the column types, both foreign keys,
    /// `order_items_quantity_check` and `order_items_price_check`.
    pub fn insert_order_item(&mut self, new: &NewOrderItem) -> QueryResult<i32> {
        let price = numeric_12_2(&new.price)?;
        let total = numeric_12_2(&new.total)?;
        if self.order(new.order_id).is_none() {
            return Err(violation(
                DatabaseErrorKind::ForeignKeyViolation,
                "order_items",
                "order_items_order_id_fkey",
                "insert or update on table \"order_items\" violates foreign key constraint \"order_items_order_id_fkey\"",
                format!("Key (order_id)=({}) is not present in table \"orders\".", new.order_id),
            ));
        }
        if self.product(new.product_id).is_none() {
            return Err(violation(
                DatabaseErrorKind::ForeignKeyViolation,
                "order_items",
                "order_items_product_id_fkey",
                "insert or update on table \"order_items\" violates foreign key constraint \"order_items_product_id_fkey\"",
                format!(
                    "Key (product_id)=({}) is not present in table \"products\".",
                    new.product_id
                ),
            ));
        }
        if new.quantity <= 0 {
            return Err(violation(
                DatabaseErrorKind::CheckViolation,
                "order_items",
                "order_items_quantity_check",
                "new row for relation \"order_items\" violates check constraint \"order_items_quantity_check\"",
                format!("Failing row contains quantity {}.", new.quantity),
            ));
        }
        if price < BigDecimal::zero() {
            return Err(violation(
                DatabaseErrorKind::CheckViolation,
                "order_items",
                "order_items_price_check",
                "new row for relation \"order_items\" violates check constraint \"order_items_price_check\"",
                format!("Failing row contains price {price}."),
            ));
        }

        self.last_item_id += 1;
        let id = self.last_item_id;
        self.order_items.push(OrderItem {
            id,
            order_id: new.order_id,
            product_id: new.product_id,
            quantity: new.quantity,
            price,
            total,
            created_at: new.created_at,
        });
        Ok(id)
    }
}

/// Counters exposed to tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub commits: usize,
    pub rollbacks: usize,
    pub connections_opened: usize,
}

#[derive(Debug)]
struct Fault {
    statement: String,
    remaining: usize,
}

#[derive(Default)]
struct StoreInner {
    tables: Arc<Mutex<MemoryTables>>,
    faults: std::sync::Mutex<Vec<Fault>>,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
    unreachable: AtomicBool,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    connections_opened: AtomicUsize,
}

/// Shared handle to an in-memory store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user row and returns its id.
    pub async fn add_user(&self, username: &str, role: Role, is_active: bool) -> i32 {
        let mut tables = self.inner.tables.lock().await;
        tables.last_user_id += 1;
        let id = tables.last_user_id;
        let now = jiff::Timestamp::now().to_diesel();
        tables.users.push(User {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "not-a-real-hash".to_string(),
            full_name: None,
            role,
            is_active,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Adds a product row and returns its id.
    pub async fn add_product(&self, name: &str, price: BigDecimal) -> i32 {
        let mut tables = self.inner.tables.lock().await;
        tables.last_product_id += 1;
        let id = tables.last_product_id;
        let now = jiff::Timestamp::now().to_diesel();
        tables.products.push(Product {
            id,
            name: name.to_string(),
            description: Some(format!("{name} description")),
            price,
            image_url: Some(format!("/images/{id}.jpg")),
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Returns a copy of the committed tables.
    pub async fn snapshot(&self) -> MemoryTables {
        self.inner.tables.lock().await.clone()
    }

    pub async fn order_count(&self) -> usize {
        self.inner.tables.lock().await.orders.len()
    }

    pub async fn item_count(&self) -> usize {
        self.inner.tables.lock().await.order_items.len()
    }

    /// Makes the `nth` upcoming execution (1-based) of `statement` fail.
    pub fn inject_fault(&self, statement: &str, nth: usize) {
        self.faults().push(Fault {
            statement: statement.to_string(),
            remaining: nth.max(1),
        });
    }

    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_rollback(&self) {
        self.inner.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            commits: self.inner.commits.load(Ordering::SeqCst),
            rollbacks: self.inner.rollbacks.load(Ordering::SeqCst),
            connections_opened: self.inner.connections_opened.load(Ordering::SeqCst),
        }
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Vec<Fault>> {
        self.inner.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_reachable(&self) -> bool {
        !self.inner.unreachable.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> QueryResult<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(DieselError::DatabaseError(
                DatabaseErrorKind::ClosedConnection,
                Box::new(MemoryErrorInfo::plain("server closed the connection unexpectedly")),
            ))
        }
    }

    fn take_fault(&self, statement: &str) -> QueryResult<()> {
        let mut faults = self.faults();
        let Some(index) = faults.iter().position(|f| f.statement == statement) else {
            return Ok(());
        };
        faults[index].remaining -= 1;
        if faults[index].remaining > 0 {
            return Ok(());
        }
        faults.remove(index);
        Err(injected(statement))
    }
}

impl bb8::ManageConnection for MemoryStore {
    type Connection = MemoryConnection;
    type Error = MemoryStoreError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        if !self.is_reachable() {
            return Err(MemoryStoreError::Unreachable);
        }
        self.inner.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
            tx: None,
        })
    }

    async fn is_valid(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(MemoryStoreError::Unreachable)
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.tx.is_some()
    }
}

struct OpenTransaction {
    guard: OwnedMutexGuard<MemoryTables>,
    snapshot: MemoryTables,
}

/// A connection to a [`MemoryStore`].
pub struct MemoryConnection {
    store: MemoryStore,
    tx: Option<OpenTransaction>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl MemoryConnection {
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) async fn begin(&mut self) -> QueryResult<()> {
        if self.tx.is_some() {
            return Err(DieselError::AlreadyInTransaction);
        }
        self.store.check_reachable()?;
        let guard = self.store.inner.tables.clone().lock_owned().await;
        let snapshot = (*guard).clone();
        self.tx = Some(OpenTransaction { guard, snapshot });
        Ok(())
    }

    pub(crate) fn commit(&mut self) -> QueryResult<()> {
        if self.tx.is_none() {
            return Err(DieselError::NotInTransaction);
        }
        self.store.check_reachable()?;
        if self.store.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(injected("COMMIT"));
        }
        self.tx = None;
        self.store.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn rollback(&mut self) -> QueryResult<()> {
        if self.tx.is_none() {
            return Err(DieselError::NotInTransaction);
        }
        // A failed rollback leaves the transaction open; the pool discards the
        // connection and the snapshot is restored when it is dropped.
        if self.store.inner.fail_next_rollback.swap(false, Ordering::SeqCst) {
            return Err(injected("ROLLBACK"));
        }
        if let Some(OpenTransaction { mut guard, snapshot }) = self.tx.take() {
            *guard = snapshot;
        }
        self.store.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) async fn run<S: Statement + ?Sized>(&mut self, statement: &S) -> QueryResult<S::Output> {
        self.store.check_reachable()?;
        self.store.take_fault(statement.name())?;
        match self.tx.as_mut() {
            Some(tx) => statement.execute_memory(&mut tx.guard),
            None => {
                let mut tables = self.store.inner.tables.lock().await;
                statement.execute_memory(&mut tables)
            }
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(OpenTransaction { mut guard, snapshot }) = self.tx.take() {
            tracing::warn!("In-memory connection dropped inside a transaction, restoring snapshot");
            *guard = snapshot;
        }
    }
}

#[derive(Debug)]
struct MemoryErrorInfo {
    message: String,
    details: Option<String>,
    table: Option<&'static str>,
    constraint: Option<&'static str>,
}

impl MemoryErrorInfo {
    fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            table: None,
            constraint: None,
        }
    }
}

impl DatabaseErrorInformation for MemoryErrorInfo {
    fn message(&self) -> &str {
        &self.message
    }

    fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    fn hint(&self) -> Option<&str> {
        None
    }

    fn table_name(&self) -> Option<&str> {
        self.table
    }

    fn column_name(&self) -> Option<&str> {
        None
    }

    fn constraint_name(&self) -> Option<&str> {
        self.constraint
    }

    fn statement_position(&self) -> Option<i32> {
        None
    }
}

fn violation(
    kind: DatabaseErrorKind,
    table: &'static str,
    constraint: &'static str,
    message: &str,
    details: String,
) -> DieselError {
    DieselError::DatabaseError(
        kind,
        Box::new(MemoryErrorInfo {
            message: message.to_string(),
            details: Some(details),
            table: Some(table),
            constraint: Some(constraint),
        }),
    )
}

fn varchar(value: &str, max: usize) -> QueryResult<()> {
    if value.chars().count() <= max {
        return Ok(());
    }
    Err(DieselError::DatabaseError(
        DatabaseErrorKind::Unknown,
        Box::new(MemoryErrorInfo::plain(format!(
            "value too long for type character varying({max})"
        ))),
    ))
}

/// Rounds half away from zero to two places and rejects anything that does
/// not fit twelve digits.
fn numeric_12_2(value: &BigDecimal) -> QueryResult<BigDecimal> {
    let rounded = value.with_scale_round(2, RoundingMode::HalfUp);
    if rounded.abs() < BigDecimal::new(1.into(), -10) {
        return Ok(rounded);
    }
    Err(DieselError::DatabaseError(
        DatabaseErrorKind::Unknown,
        Box::new(MemoryErrorInfo {
            details: Some(
                "A field with precision 12, scale 2 must round to an absolute value less than 10^10."
                    .to_string(),
            ),
            ..MemoryErrorInfo::plain("numeric field overflow")
        }),
    ))
}

fn injected(statement: &str) -> DieselError {
    DieselError::DatabaseError(
        DatabaseErrorKind::Unknown,
        Box::new(MemoryErrorInfo::plain(format!("injected failure in {statement}"))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, PaymentMethod, PaymentStatus};
    use bb8::ManageConnection;

    fn now() -> jiff_diesel::Timestamp {
        jiff::Timestamp::now().to_diesel()
    }

    fn new_order(user_id: i32, number: &str) -> NewOrder {
        NewOrder {
            order_number: number.to_string(),
            user_id,
            total_amount: BigDecimal::from(10),
            shipping_address: "{}".to_string(),
            phone: "555".to_string(),
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Stripe,
            payment_status: PaymentStatus::Pending,
            notes: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn tables_with_user() -> MemoryTables {
        let mut tables = MemoryTables::default();
        tables.users.push(User {
            id: 1,
            username: "a".to_string(),
            email: "a@example.com".to_string(),
            password: String::new(),
            full_name: None,
            role: Role::Customer,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        });
        tables.products.push(Product {
            id: 1,
            name: "Widget".to_string(),
            description: None,
            price: BigDecimal::from(10),
            image_url: None,
            created_at: now(),
            updated_at: now(),
        });
        tables
    }

    fn new_item(order_id: i32, price: &str, total: &str) -> NewOrderItem {
        NewOrderItem {
            order_id,
            product_id: 1,
            quantity: 1,
            price: price.parse().unwrap(),
            total: total.parse().unwrap(),
            created_at: now(),
        }
    }

    fn message(err: &DieselError) -> String {
        match err {
            DieselError::DatabaseError(_, info) => info.message().to_string(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unique_order_number() {
        let mut tables = tables_with_user();
        assert_eq!(tables.insert_order(&new_order(1, "ORD-1")).unwrap(), 1);
        let err = tables.insert_order(&new_order(1, "ORD-1")).unwrap_err();
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                assert_eq!(info.constraint_name(), Some("orders_order_number_key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_varchar_columns_are_bounded() {
        let mut tables = tables_with_user();

        let mut order = new_order(1, "ORD-6");
        order.phone = "5".repeat(33);
        let err = tables.insert_order(&order).unwrap_err();
        assert_eq!(message(&err), "value too long for type character varying(32)");

        let err = tables.insert_order(&new_order(1, &"9".repeat(33))).unwrap_err();
        assert_eq!(message(&err), "value too long for type character varying(32)");

        order.phone = "5".repeat(32);
        assert!(tables.insert_order(&order).is_ok());
    }

    #[test]
    fn test_order_total_must_be_positive() {
        let mut tables = tables_with_user();
        let mut order = new_order(1, "ORD-7");
        // Rounds to 0.00 before the check runs.
        order.total_amount = "0.004".parse().unwrap();

        match tables.insert_order(&order).unwrap_err() {
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                assert_eq!(info.constraint_name(), Some("orders_total_amount_check"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tables.orders.is_empty());
    }

    #[test]
    fn test_money_is_stored_at_numeric_12_2() {
        let mut tables = tables_with_user();
        let mut order = new_order(1, "ORD-8");
        order.total_amount = "0.010".parse().unwrap();
        let order_id = tables.insert_order(&order).unwrap();
        tables.insert_order_item(&new_item(order_id, "0.005", "0.005")).unwrap();
        tables.insert_order_item(&new_item(order_id, "0.005", "0.005")).unwrap();

        // Each line rounds up on its own, so unscaled prices drift from the total.
        let stored_lines = tables
            .order_items
            .iter()
            .fold(BigDecimal::zero(), |sum, item| sum + &item.total);
        assert_eq!(tables.orders[0].total_amount.to_string(), "0.01");
        assert_eq!(stored_lines.to_string(), "0.02");

        let err = tables
            .insert_order_item(&new_item(order_id, "1.00", "10000000000.00"))
            .unwrap_err();
        assert_eq!(message(&err), "numeric field overflow");
    }

    #[test]
    fn test_negative_line_price_is_rejected() {
        let mut tables = tables_with_user();
        let order_id = tables.insert_order(&new_order(1, "ORD-9")).unwrap();

        match tables.insert_order_item(&new_item(order_id, "-1.00", "-1.00")).unwrap_err() {
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                assert_eq!(info.constraint_name(), Some("order_items_price_check"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_order_requires_user() {
        let mut tables = MemoryTables::default();
        let err = tables.insert_order(&new_order(42, "ORD-2")).unwrap_err();
        assert!(matches!(
            err,
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        let user = store.add_user("alice", Role::Customer, true).await;
        let mut conn = store.connect().await.unwrap();

        conn.begin().await.unwrap();
        conn.tx
            .as_mut()
            .unwrap()
            .guard
            .insert_order(&new_order(user, "ORD-3"))
            .unwrap();
        conn.rollback().unwrap();

        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_broken_and_restored() {
        let store = MemoryStore::new();
        let user = store.add_user("bob", Role::Customer, true).await;
        let mut conn = store.connect().await.unwrap();

        conn.begin().await.unwrap();
        conn.tx
            .as_mut()
            .unwrap()
            .guard
            .insert_order(&new_order(user, "ORD-4"))
            .unwrap();
        assert!(store.has_broken(&mut conn));
        drop(conn);

        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_keeps_writes_and_can_be_failed() {
        let store = MemoryStore::new();
        let user = store.add_user("carol", Role::Customer, true).await;
        let mut conn = store.connect().await.unwrap();

        conn.begin().await.unwrap();
        conn.tx
            .as_mut()
            .unwrap()
            .guard
            .insert_order(&new_order(user, "ORD-5"))
            .unwrap();
        store.fail_next_commit();
        assert!(conn.commit().is_err());
        assert!(conn.in_transaction());
        conn.commit().unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_refuses_connections() {
        let store = MemoryStore::new();
        store.set_reachable(false);
        assert!(store.connect().await.is_err());
        store.set_reachable(true);
        assert!(store.connect().await.is_ok());
    }
}
