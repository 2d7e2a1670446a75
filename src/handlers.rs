use std::collections::HashMap;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use argon2::Config as ArgonConfig;
use mongodb::bson::doc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::checkout;
use crate::config::Config;
use crate::db::{self, Stores};
use crate::error::ApiError;
use crate::middleware::issue_token;
use crate::models::{
    AuthResponse, AuthedUser, Cart, CartUpdateInput, CartView, ExpandedItem, LoginInput, Order,
    OrderView, Product, ProductInput, ProductPatch, RegisterInput, Role, User,
};

fn authed(req: &HttpRequest) -> Result<AuthedUser, ApiError> {
    req.extensions()
        .get::<AuthedUser>()
        .cloned()
        .ok_or(ApiError::Unauthorized("No token provided"))
}

fn require_admin(user: &AuthedUser) -> Result<(), ApiError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Customer => Err(ApiError::Forbidden),
    }
}

pub async fn register(
    stores: web::Data<Stores>,
    input: web::Json<RegisterInput>,
) -> Result<HttpResponse, ApiError> {
    if input.username.is_empty() || input.password.is_empty() {
        return Err(ApiError::BadRequest("Missing fields".to_string()));
    }
    if stores
        .users
        .find_one(doc! {"username": &input.username}, None)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("User exists".to_string()));
    }

    let salt: [u8; 16] = rand::thread_rng().gen();
    let hashed = argon2::hash_encoded(
        input.password.as_bytes(),
        &salt,
        &ArgonConfig::default(),
    )
    .map_err(|err| {
        log::error!("password hashing failed: {err}");
        ApiError::Internal
    })?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: input.username.clone(),
        password: hashed,
        role: input.role.unwrap_or(Role::Customer),
    };
    if let Err(err) = stores.users.insert_one(&user, None).await {
        // The unique index catches a registration racing the pre-check.
        if db::is_duplicate_key(&err) {
            return Err(ApiError::Conflict("User exists".to_string()));
        }
        return Err(err.into());
    }
    Ok(HttpResponse::Ok().json(json!({"msg": "User registered"})))
}

pub async fn login(
    stores: web::Data<Stores>,
    config: web::Data<Config>,
    input: web::Json<LoginInput>,
) -> Result<HttpResponse, ApiError> {
    if input.username.is_empty() || input.password.is_empty() {
        return Err(ApiError::BadRequest("Missing fields".to_string()));
    }

    let user = stores
        .users
        .find_one(doc! {"username": &input.username}, None)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid credentials".to_string()))?;

    if !argon2::verify_encoded(&user.password, input.password.as_bytes()).unwrap_or(false) {
        return Err(ApiError::BadRequest("Invalid credentials".to_string()));
    }

    let token = issue_token(&user, &config.jwt_secret).map_err(|err| {
        log::error!("failed to sign token: {err}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        role: user.role,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_products(
    stores: web::Data<Stores>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = query.page.unwrap_or(1).clamp(1, 1_000_000);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let products = stores
        .search_products(query.search.as_deref(), page, limit)
        .await?;
    Ok(HttpResponse::Ok().json(products))
}

pub async fn create_product(
    stores: web::Data<Stores>,
    input: web::Json<ProductInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    require_admin(&user)?;

    let price = match input.price {
        Some(price) if price >= Decimal::ZERO => price,
        Some(_) => return Err(ApiError::BadRequest("Price must not be negative".to_string())),
        None => return Err(ApiError::BadRequest("Missing fields".to_string())),
    };
    if input.name.is_empty() {
        return Err(ApiError::BadRequest("Missing fields".to_string()));
    }

    let product = Product {
        id: Uuid::new_v4().to_string(),
        name: input.name.clone(),
        description: input.description.clone(),
        price,
        category: input.category.clone(),
    };
    stores.products.insert_one(&product, None).await?;
    Ok(HttpResponse::Ok().json(json!({"msg": "Product created"})))
}

pub async fn update_product(
    stores: web::Data<Stores>,
    id: web::Path<String>,
    patch: web::Json<ProductPatch>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    require_admin(&user)?;

    let mut set = doc! {};
    if let Some(name) = &patch.name {
        set.insert("name", name.as_str());
    }
    if let Some(description) = &patch.description {
        set.insert("description", description.as_str());
    }
    if let Some(price) = patch.price {
        if price < Decimal::ZERO {
            return Err(ApiError::BadRequest("Price must not be negative".to_string()));
        }
        // Prices are stored in their string form, matching the document model.
        set.insert("price", price.to_string());
    }
    if let Some(category) = &patch.category {
        set.insert("category", category.as_str());
    }

    if !set.is_empty() {
        stores
            .products
            .update_one(doc! {"_id": id.as_str()}, doc! {"$set": set}, None)
            .await?;
    }
    Ok(HttpResponse::Ok().json(json!({"msg": "Product updated"})))
}

pub async fn delete_product(
    stores: web::Data<Stores>,
    id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    require_admin(&user)?;

    stores
        .products
        .delete_one(doc! {"_id": id.as_str()}, None)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"msg": "Product deleted"})))
}

fn cart_view(cart: &Cart, catalog: &HashMap<String, Product>) -> CartView {
    CartView {
        id: cart.id.clone(),
        items: cart
            .items
            .iter()
            .map(|item| ExpandedItem {
                product: catalog.get(&item.product_id).cloned(),
                quantity: item.quantity,
            })
            .collect(),
    }
}

fn order_view(order: &Order, catalog: &HashMap<String, Product>) -> OrderView {
    OrderView {
        id: order.id.clone(),
        items: order
            .items
            .iter()
            .map(|line| ExpandedItem {
                product: catalog.get(&line.product_id).cloned(),
                quantity: line.quantity,
            })
            .collect(),
        total_price: order.total_price,
        created_at: order.created_at,
    }
}

pub async fn get_cart(
    stores: web::Data<Stores>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    let cart = stores.get_or_create_cart(&user.id).await?;

    let ids: Vec<String> = cart
        .items
        .iter()
        .map(|item| item.product_id.clone())
        .collect();
    let catalog = stores.products_by_ids(&ids).await?;
    Ok(HttpResponse::Ok().json(cart_view(&cart, &catalog)))
}

pub async fn update_cart(
    stores: web::Data<Stores>,
    input: web::Json<CartUpdateInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    if input.quantity < 1 {
        return Err(ApiError::BadRequest("Invalid data".to_string()));
    }
    if stores.find_product(&input.product_id).await?.is_none() {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    let mut cart = stores.get_or_create_cart(&user.id).await?;
    cart.set_item(&input.product_id, input.quantity);
    stores.save_cart_items(&user.id, &cart.items).await?;
    Ok(HttpResponse::Ok().json(json!({"msg": "Cart updated"})))
}

pub async fn remove_cart_item(
    stores: web::Data<Stores>,
    product_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    let mut cart = stores
        .load_cart(&user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Cart not found".to_string()))?;

    // Removing a product that was never in the cart is a success, not an error.
    cart.remove_item(&product_id);
    stores.save_cart_items(&user.id, &cart.items).await?;
    Ok(HttpResponse::Ok().json(json!({"msg": "Item removed from cart"})))
}

pub async fn create_order(
    stores: web::Data<Stores>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    let order = checkout::place_order(&stores, &user.id).await?;
    Ok(HttpResponse::Ok().json(json!({"msg": "Order placed", "orderId": order.id})))
}

pub async fn list_orders(
    stores: web::Data<Stores>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authed(&req)?;
    let orders = stores.orders_for(&user.id).await?;

    let mut ids: Vec<String> = orders
        .iter()
        .flat_map(|order| order.items.iter().map(|line| line.product_id.clone()))
        .collect();
    ids.sort();
    ids.dedup();

    let catalog = stores.products_by_ids(&ids).await?;
    let views: Vec<OrderView> = orders
        .iter()
        .map(|order| order_view(order, &catalog))
        .collect();
    Ok(HttpResponse::Ok().json(views))
}
