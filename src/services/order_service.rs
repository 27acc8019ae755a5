//! Order placement and lifecycle.
//!
//! Placement validates and prices the cart, writes the order and its lines
//! in one transaction, then reads the committed order back on a fresh
//! connection. Lifecycle changes are single conditional updates, so two
//! concurrent requests cannot both move an order forward.

use std::sync::Arc;

use futures::FutureExt;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{
    NewOrder, NewOrderItem, Order, OrderDetails, OrderOwner, OrderStatus, PaymentStatus,
};
use crate::repositories::OrderRepository;
use crate::services::auth_service::AuthUser;
use crate::services::order_draft::{OrderDraft, PlaceOrder};
use crate::services::order_number::OrderNumberGenerator;

/// Payment confirmation supplied by the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInfo {
    pub payment_id: String,
    pub payer_email: String,
}

/// Stored on the order as JSON text.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetails<'a> {
    payment_id: &'a str,
    payer_email: &'a str,
    paid_at: Timestamp,
}

#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
    numbers: Arc<OrderNumberGenerator>,
}

impl OrderService {
    pub fn new(orders: OrderRepository) -> Self {
        Self::with_generator(orders, Arc::new(OrderNumberGenerator::new()))
    }

    pub fn with_generator(orders: OrderRepository, numbers: Arc<OrderNumberGenerator>) -> Self {
        Self { orders, numbers }
    }

    /// Places an order for `actor`.
    ///
    /// Nothing touches the store until the cart has been validated. Any
    /// failure inside the transaction rolls back every row written. A failure
    /// while reading the committed order back is reported as
    /// [`AppError::PartialSuccess`]; the order stays in place.
    pub async fn place_order(&self, actor: &AuthUser, request: PlaceOrder) -> AppResult<OrderDetails> {
        let draft = OrderDraft::build(request)?;
        if let Some(client_total) = draft.mismatched_client_total() {
            tracing::warn!(
                user_id = actor.user_id,
                client_total = %client_total,
                computed_total = %draft.total,
                "Client total differs from computed total, using computed total"
            );
        }

        let order_number = self.numbers.next();
        let now = Timestamp::now();
        let new_order = NewOrder {
            order_number: order_number.clone(),
            user_id: actor.user_id,
            total_amount: draft.total.clone(),
            shipping_address: draft.shipping_address,
            phone: draft.phone,
            status: OrderStatus::Pending,
            payment_method: draft.payment_method,
            payment_status: PaymentStatus::Pending,
            notes: draft.notes,
            created_at: now.to_diesel(),
            updated_at: now.to_diesel(),
        };
        let lines = draft.lines;

        let repo = self.orders.clone();
        let order_id = self
            .orders
            .pool()
            .with_transaction(move |conn| {
                async move {
                    let order_id = repo.insert(new_order, conn).await?;
                    for line in lines {
                        let item = NewOrderItem {
                            order_id,
                            product_id: line.product_id,
                            quantity: line.quantity,
                            price: line.price,
                            total: line.total,
                            created_at: now.to_diesel(),
                        };
                        repo.insert_item(item, conn).await?;
                    }
                    Ok::<_, AppError>(order_id)
                }
                .boxed()
            })
            .await?;

        tracing::info!(
            order_id,
            order_number = %order_number,
            user_id = actor.user_id,
            total = %draft.total,
            "Order placed"
        );

        let partial = |source: AppError| AppError::PartialSuccess {
            order_id,
            order_number: order_number.clone(),
            source: Box::new(source),
        };
        match self.orders.find_details(order_id).await {
            Ok(Some(details)) => Ok(details),
            Ok(None) => Err(partial(AppError::not_found("order", "id", order_id))),
            Err(e) => {
                tracing::error!(order_id, error = %e, "Order committed but could not be read back");
                Err(partial(e))
            }
        }
    }

    /// Returns an order with its lines. Only the owner or an admin may read it.
    pub async fn get_order_by_id(&self, actor: &AuthUser, order_id: i32) -> AppResult<OrderDetails> {
        let details = self
            .orders
            .find_details(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order", "id", order_id))?;

        if details.order.user_id != actor.user_id && !actor.is_admin() {
            return Err(AppError::Forbidden {
                message: "Not authorized to view this order".to_string(),
            });
        }
        Ok(details)
    }

    /// The caller's orders, newest first.
    pub async fn list_my_orders(&self, actor: &AuthUser) -> AppResult<Vec<Order>> {
        self.orders.list_by_user(actor.user_id).await
    }

    /// Every order with its owner, newest first. Admin only.
    pub async fn list_orders(&self, actor: &AuthUser) -> AppResult<Vec<(Order, OrderOwner)>> {
        require_admin(actor)?;
        self.orders.list_all().await
    }

    /// Records a payment made by the order's owner.
    pub async fn mark_paid(
        &self,
        order_id: i32,
        actor: &AuthUser,
        payment: PaymentInfo,
    ) -> AppResult<Order> {
        let order = self.load(order_id).await?;
        if order.user_id != actor.user_id {
            return Err(AppError::Forbidden {
                message: "Not authorized to pay for this order".to_string(),
            });
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(AppError::invalid_transition(order_id, "Order is already paid"));
        }

        let paid_at = Timestamp::now();
        let details = serde_json::to_string(&PaymentDetails {
            payment_id: &payment.payment_id,
            payer_email: &payment.payer_email,
            paid_at,
        })
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::new(e).context("failed to serialize payment details"),
        })?;

        let changed = self
            .orders
            .mark_paid(order_id, actor.user_id, details, paid_at.to_diesel())
            .await?;
        if changed == 0 {
            return Err(AppError::invalid_transition(order_id, "Order is already paid"));
        }

        tracing::info!(order_id, user_id = actor.user_id, payment_id = %payment.payment_id, "Order paid");
        self.load(order_id).await
    }

    /// Marks an order delivered. Admin only. Cash-on-delivery orders may be
    /// delivered before they are paid.
    pub async fn mark_delivered(&self, order_id: i32, actor: &AuthUser) -> AppResult<Order> {
        require_admin(actor)?;

        let order = self.load(order_id).await?;
        if order.status == OrderStatus::Delivered {
            return Err(AppError::invalid_transition(order_id, "Order is already delivered"));
        }
        if !order.can_deliver() {
            return Err(AppError::invalid_transition(
                order_id,
                "Order must be paid before delivery unless it is cash on delivery",
            ));
        }

        let changed = self
            .orders
            .mark_delivered(order_id, Timestamp::now().to_diesel())
            .await?;
        if changed == 0 {
            return Err(AppError::invalid_transition(
                order_id,
                "Order changed before it could be delivered",
            ));
        }

        tracing::info!(order_id, user_id = actor.user_id, "Order delivered");
        self.load(order_id).await
    }

    async fn load(&self, order_id: i32) -> AppResult<Order> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order", "id", order_id))
    }
}

fn require_admin(actor: &AuthUser) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            message: "Admin access required".to_string(),
        })
    }
}
