use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Access tier carried on the user document and inside issued tokens.
/// Closed set: anything else fails deserialization at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// The verified principal a request is acting as, taken from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductInput {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: i32,
}

/// A user's pending selection. At most one item per product; quantities are
/// validated (>= 1) before they reach this type.
#[derive(Debug, Serialize, Deserialize)]
pub struct Cart {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Replaces the quantity when the product is already in the cart,
    /// appends a new item otherwise.
    pub fn set_item(&mut self, product_id: &str, quantity: i32) {
        match self.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity = quantity,
            None => self.items.push(CartItem {
                product_id: product_id.to_string(),
                quantity,
            }),
        }
    }

    /// Removes the product if present. Returns whether anything changed;
    /// removing an absent product is a no-op.
    pub fn remove_item(&mut self, product_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        self.items.len() != before
    }
}

#[derive(Debug, Deserialize)]
pub struct CartUpdateInput {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub quantity: i32,
}

/// A frozen purchase line. No per-line price is kept; only the order's
/// aggregate total is fixed at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub items: Vec<OrderLineItem>,
    pub total_price: Decimal,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A cart or order line with its product joined in. `product` is null when
/// the referenced product has since been deleted.
#[derive(Debug, Serialize)]
pub struct ExpandedItem {
    pub product: Option<Product>,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: String,
    pub items: Vec<ExpandedItem>,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: String,
    pub items: Vec<ExpandedItem>,
    #[serde(rename = "totalPrice")]
    pub total_price: Decimal,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
