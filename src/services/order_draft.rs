//! Cart validation and server-side pricing.
//!
//! Everything here runs before the store is touched: a draft that builds
//! successfully is ready to be written.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ValidationFieldError};
use crate::models::PaymentMethod;

/// Money columns are `NUMERIC(12, 2)`.
pub const MONEY_SCALE: i64 = 2;
const MONEY_DIGITS: i64 = 12;

/// Longest phone number the `orders.phone` column holds.
pub const MAX_PHONE_LEN: usize = 32;

/// One cart entry as submitted. `price` is the unit price the customer saw.
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    pub product_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// Delivery address, stored on the order as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Input to order placement.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    pub shipping_phone: String,
    pub payment_method: PaymentMethod,
    /// Total computed by the client; only compared against the server total.
    pub client_total: Option<BigDecimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftLine {
    pub product_id: i32,
    pub quantity: i32,
    pub price: BigDecimal,
    pub total: BigDecimal,
}

/// A validated, priced order ready to be inserted.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub lines: Vec<DraftLine>,
    pub total: BigDecimal,
    pub shipping_address: String,
    pub phone: String,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub client_total: Option<BigDecimal>,
}

impl OrderDraft {
    /// Validates the cart and computes every line total and the order total.
    pub fn build(request: PlaceOrder) -> AppResult<Self> {
        let mut errors = Vec::new();

        if request.items.is_empty() {
            errors.push(field_error("orderItems", "No order items provided"));
        }
        for (index, item) in request.items.iter().enumerate() {
            if item.quantity <= 0 {
                errors.push(field_error(
                    &format!("orderItems[{index}].qty"),
                    "Quantity must be positive",
                ));
            }
            if item.price < BigDecimal::zero() {
                errors.push(field_error(
                    &format!("orderItems[{index}].price"),
                    "Price cannot be negative",
                ));
            } else if !has_money_scale(&item.price) {
                errors.push(field_error(
                    &format!("orderItems[{index}].price"),
                    "Price cannot have more than 2 decimal places",
                ));
            } else if !fits_money_column(&(&item.price * BigDecimal::from(item.quantity.max(1)))) {
                errors.push(field_error(
                    &format!("orderItems[{index}].price"),
                    "Line total is too large",
                ));
            }
        }
        if request.shipping_address.street.trim().is_empty() {
            errors.push(field_error("shippingAddress.street", "Street address is required"));
        }
        let phone = request.shipping_phone.trim().to_string();
        if phone.is_empty() {
            errors.push(field_error("shippingPhone", "Shipping phone is required"));
        } else if phone.chars().count() > MAX_PHONE_LEN {
            errors.push(field_error(
                "shippingPhone",
                "Shipping phone cannot exceed 32 characters",
            ));
        }

        let lines: Vec<DraftLine> = request
            .items
            .iter()
            .map(|item| {
                let price = item.price.with_scale(MONEY_SCALE);
                DraftLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    total: &price * BigDecimal::from(item.quantity),
                    price,
                }
            })
            .collect();
        let total = lines
            .iter()
            .fold(BigDecimal::zero(), |sum, line| sum + &line.total);

        if errors.is_empty() && total <= BigDecimal::zero() {
            errors.push(field_error("totalAmount", "Order total must be positive"));
        } else if errors.is_empty() && !fits_money_column(&total) {
            errors.push(field_error("totalAmount", "Order total is too large"));
        }

        match errors.len() {
            0 => {}
            1 => {
                let error = errors.remove(0);
                return Err(AppError::Validation {
                    field: error.field,
                    reason: error.message,
                });
            }
            _ => return Err(AppError::ValidationErrors { errors }),
        }

        let shipping_address =
            serde_json::to_string(&request.shipping_address).map_err(|e| AppError::Internal {
                source: anyhow::Error::new(e).context("failed to serialize shipping address"),
            })?;

        Ok(Self {
            lines,
            total,
            shipping_address,
            phone,
            payment_method: request.payment_method,
            notes: request
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            client_total: request.client_total,
        })
    }

    /// The client total when it disagrees with the computed one.
    pub fn mismatched_client_total(&self) -> Option<&BigDecimal> {
        self.client_total.as_ref().filter(|client| **client != self.total)
    }
}

/// True when the value is exact at two decimal places, so the stored line
/// totals add up to the stored order total.
fn has_money_scale(value: &BigDecimal) -> bool {
    value.normalized().as_bigint_and_exponent().1 <= MONEY_SCALE
}

fn fits_money_column(value: &BigDecimal) -> bool {
    value.abs() < BigDecimal::new(1.into(), MONEY_SCALE - MONEY_DIGITS)
}

fn field_error(field: &str, message: &str) -> ValidationFieldError {
    ValidationFieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}
