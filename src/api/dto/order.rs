//! Order request and response DTOs.
//!
//! Requests use camelCase field names; responses use snake_case.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{
    Order, OrderDetails, OrderLine, OrderOwner, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::services::{CartItem, PaymentInfo, PlaceOrder, ShippingAddress};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "orderItems": [{ "productId": 7, "qty": 2, "price": "10.00" }],
    "shippingAddress": { "street": "1 Main St", "city": "Springfield" },
    "shippingPhone": "555-0100",
    "paymentMethod": "cash_on_delivery",
    "totalAmount": "20.00"
}))]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub order_items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub shipping_address: ShippingAddressRequest,
    #[serde(default)]
    #[validate(length(max = 32, message = "Shipping phone must be at most 32 characters"))]
    pub shipping_phone: String,
    pub payment_method: PaymentMethod,
    /// Client-side total; the server recomputes it and only logs a mismatch
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<BigDecimal>,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: i32,
    pub qty: i32,
    /// Unit price shown to the customer
    #[schema(value_type = String, example = "10.00")]
    pub price: BigDecimal,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressRequest {
    #[serde(default, alias = "address")]
    pub street: String,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl From<PlaceOrderRequest> for PlaceOrder {
    fn from(request: PlaceOrderRequest) -> Self {
        PlaceOrder {
            items: request
                .order_items
                .into_iter()
                .map(|item| CartItem {
                    product_id: item.product_id,
                    quantity: item.qty,
                    price: item.price,
                })
                .collect(),
            shipping_address: ShippingAddress {
                street: request.shipping_address.street,
                city: request.shipping_address.city,
                postal_code: request.shipping_address.postal_code,
                country: request.shipping_address.country,
            },
            shipping_phone: request.shipping_phone,
            payment_method: request.payment_method,
            client_total: request.total_amount,
            notes: request.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[validate(length(min = 1, max = 128, message = "Payment id is required"))]
    pub payment_id: String,
    #[validate(email(message = "Invalid email format"))]
    pub payer_email: String,
}

impl From<PaymentRequest> for PaymentInfo {
    fn from(request: PaymentRequest) -> Self {
        PaymentInfo {
            payment_id: request.payment_id,
            payer_email: request.payer_email,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: i32,
    pub order_number: String,
    pub user_id: i32,
    #[schema(value_type = String, example = "20.00")]
    pub total_amount: BigDecimal,
    /// Structured address, or the stored text when it is not valid JSON
    #[schema(value_type = Object)]
    pub shipping_address: Value,
    pub phone: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[schema(value_type = Option<Object>)]
    pub payment_details: Option<Value>,
    pub notes: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: jiff::Timestamp,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: jiff::Timestamp,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let shipping_address = rehydrate(order.id, "shipping_address", order.shipping_address);
        let payment_details = order
            .payment_details
            .map(|raw| rehydrate(order.id, "payment_details", raw));

        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            total_amount: order.total_amount,
            shipping_address,
            phone: order.phone,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            payment_details,
            notes: order.notes,
            created_at: order.created_at.to_jiff(),
            updated_at: order.updated_at.to_jiff(),
        }
    }
}

/// Parses a stored JSON column, keeping the raw text when it does not parse.
fn rehydrate(order_id: i32, column: &str, raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(order_id, column, error = %e, "Stored value is not valid JSON");
            Value::String(raw)
        }
    }
}

/// An order line with the product it references.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub id: i32,
    pub product_id: i32,
    pub name: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    #[schema(value_type = String)]
    pub total: BigDecimal,
}

impl From<OrderLine> for OrderLineResponse {
    fn from(line: OrderLine) -> Self {
        Self {
            id: line.item.id,
            product_id: line.item.product_id,
            name: line.product.name,
            image_url: line.product.image_url,
            description: line.product.description,
            quantity: line.item.quantity,
            price: line.item.price,
            total: line.item.total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailsResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub order_items: Vec<OrderLineResponse>,
}

impl From<OrderDetails> for OrderDetailsResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            order: details.order.into(),
            order_items: details.lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderOwnerResponse {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
}

/// Admin listing entry: the order plus its owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminOrderResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub user: OrderOwnerResponse,
}

impl From<(Order, OrderOwner)> for AdminOrderResponse {
    fn from((order, owner): (Order, OrderOwner)) -> Self {
        Self {
            order: order.into(),
            user: OrderOwnerResponse {
                username: owner.username,
                email: owner.email,
                full_name: owner.full_name,
            },
        }
    }
}
