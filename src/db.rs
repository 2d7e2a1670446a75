use std::collections::HashMap;
use std::time::Duration;

use futures::stream::StreamExt;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Cart, CartItem, Order, Product, User};

/// Typed handles on the backing collections. Cloned into every worker;
/// the handles share one connection pool.
#[derive(Clone)]
pub struct Stores {
    pub users: Collection<User>,
    pub products: Collection<Product>,
    pub carts: Collection<Cart>,
    pub orders: Collection<Order>,
}

pub async fn connect(config: &Config) -> mongodb::error::Result<Stores> {
    let mut options = ClientOptions::parse(&config.database_url).await?;
    // Fail fast instead of hanging on an unreachable store.
    options.server_selection_timeout = Some(Duration::from_secs(5));
    options.connect_timeout = Some(Duration::from_secs(10));

    let client = Client::with_options(options)?;
    let db = client
        .default_database()
        .unwrap_or_else(|| client.database("storefront"));

    let stores = Stores {
        users: db.collection("users"),
        products: db.collection("products"),
        carts: db.collection("carts"),
        orders: db.collection("orders"),
    };
    stores.ensure_indexes().await?;
    Ok(stores)
}

impl Stores {
    async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let unique = IndexOptions::builder().unique(true).build();
        self.users
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"username": 1})
                    .options(unique.clone())
                    .build(),
                None,
            )
            .await?;
        // One cart document per user.
        self.carts
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"user_id": 1})
                    .options(unique)
                    .build(),
                None,
            )
            .await?;
        self.orders
            .create_index(
                IndexModel::builder().keys(doc! {"user_id": 1}).build(),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn find_product(&self, id: &str) -> mongodb::error::Result<Option<Product>> {
        self.products.find_one(doc! {"_id": id}, None).await
    }

    /// One `$in` fetch for every product a cart or order set refers to,
    /// keyed by product id. Deleted products are simply absent.
    pub async fn products_by_ids(
        &self,
        ids: &[String],
    ) -> mongodb::error::Result<HashMap<String, Product>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut catalog = HashMap::new();
        let mut cursor = self
            .products
            .find(doc! {"_id": {"$in": ids.to_vec()}}, None)
            .await?;
        while let Some(product) = cursor.next().await {
            let product = product?;
            catalog.insert(product.id.clone(), product);
        }
        Ok(catalog)
    }

    pub async fn search_products(
        &self,
        search: Option<&str>,
        page: i64,
        limit: i64,
    ) -> mongodb::error::Result<Vec<Product>> {
        let filter = match search {
            Some(term) if !term.is_empty() => {
                doc! {"name": {"$regex": escape_regex(term), "$options": "i"}}
            }
            _ => doc! {},
        };
        let options = FindOptions::builder()
            .skip(((page - 1) * limit) as u64)
            .limit(limit)
            .build();

        let mut cursor = self.products.find(filter, options).await?;
        let mut products = Vec::new();
        while let Some(product) = cursor.next().await {
            products.push(product?);
        }
        Ok(products)
    }

    pub async fn load_cart(&self, user_id: &str) -> mongodb::error::Result<Option<Cart>> {
        self.carts.find_one(doc! {"user_id": user_id}, None).await
    }

    /// Carts are created lazily, on the first read or write for a user.
    pub async fn get_or_create_cart(&self, user_id: &str) -> mongodb::error::Result<Cart> {
        if let Some(cart) = self.load_cart(user_id).await? {
            return Ok(cart);
        }
        let cart = Cart {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            items: Vec::new(),
        };
        match self.carts.insert_one(&cart, None).await {
            Ok(_) => Ok(cart),
            // A concurrent first access won the insert; use theirs.
            Err(err) if is_duplicate_key(&err) => {
                Ok(self.load_cart(user_id).await?.unwrap_or(cart))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn save_cart_items(
        &self,
        user_id: &str,
        items: &[CartItem],
    ) -> mongodb::error::Result<()> {
        let items = mongodb::bson::to_bson(items)?;
        self.carts
            .update_one(
                doc! {"user_id": user_id},
                doc! {
                    "$set": {"items": items},
                    "$setOnInsert": {"_id": Uuid::new_v4().to_string()},
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    /// Empties the cart without deleting the document.
    pub async fn clear_cart(&self, user_id: &str) -> mongodb::error::Result<()> {
        self.carts
            .update_one(doc! {"user_id": user_id}, doc! {"$set": {"items": []}}, None)
            .await?;
        Ok(())
    }

    pub async fn orders_for(&self, user_id: &str) -> mongodb::error::Result<Vec<Order>> {
        let mut cursor = self.orders.find(doc! {"user_id": user_id}, None).await?;
        let mut orders = Vec::new();
        while let Some(order) = cursor.next().await {
            orders.push(order?);
        }
        Ok(orders)
    }
}

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == 11000
    )
}

/// The store interprets `$regex` patterns; search terms must match literally.
fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if r".^$*+?()[]{}|\".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
