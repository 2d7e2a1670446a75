use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::db::Stores;
use crate::error::ApiError;
use crate::models::{CartItem, Order, OrderLineItem, Product};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("product {0} is no longer available")]
    ProductGone(String),
    #[error(transparent)]
    Store(#[from] mongodb::error::Error),
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart => ApiError::EmptyCart,
            CheckoutError::ProductGone(_) => {
                ApiError::NotFound("Product no longer available".to_string())
            }
            CheckoutError::Store(err) => err.into(),
        }
    }
}

/// Frozen line items plus the total they priced out to.
#[derive(Debug)]
pub struct PricedCart {
    pub lines: Vec<OrderLineItem>,
    pub total: Decimal,
}

/// Prices every cart line against the catalog snapshot using decimal
/// arithmetic. A line whose product has vanished since it was added fails the
/// whole checkout rather than silently shrinking the basket.
pub fn price_items(
    items: &[CartItem],
    catalog: &HashMap<String, Product>,
) -> Result<PricedCart, CheckoutError> {
    let mut lines = Vec::with_capacity(items.len());
    let mut total = Decimal::ZERO;
    for item in items {
        let product = catalog
            .get(&item.product_id)
            .ok_or_else(|| CheckoutError::ProductGone(item.product_id.clone()))?;
        total += product.price * Decimal::from(item.quantity);
        lines.push(OrderLineItem {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
        });
    }
    Ok(PricedCart { lines, total })
}

/// Converts the caller's cart into an order: validate, price, persist, clear.
///
/// The order insert and the cart clear are separate single-document writes; a
/// failure between them leaves the order placed with the cart still full, and
/// surfaces to the caller as a server error. Nothing is written before the
/// cart has been validated and fully priced.
pub async fn place_order(stores: &Stores, user_id: &str) -> Result<Order, CheckoutError> {
    let cart = match stores.load_cart(user_id).await? {
        Some(cart) if !cart.items.is_empty() => cart,
        _ => return Err(CheckoutError::EmptyCart),
    };

    let ids: Vec<String> = cart
        .items
        .iter()
        .map(|item| item.product_id.clone())
        .collect();
    let catalog = stores.products_by_ids(&ids).await?;
    let priced = price_items(&cart.items, &catalog)?;

    let order = Order {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        items: priced.lines,
        total_price: priced.total,
        created_at: Utc::now(),
    };
    stores.orders.insert_one(&order, None).await?;
    stores.clear_cart(user_id).await?;
    Ok(order)
}
