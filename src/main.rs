use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

mod checkout;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;

use config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let stores = match db::connect(&config).await {
        Ok(stores) => stores,
        Err(err) => {
            log::error!("failed to connect to MongoDB: {err}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    log::info!("listening on port {port}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(stores.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                error::ApiError::BadRequest(err.to_string()).into()
            }))
            .wrap(middleware::AuthMiddleware::new(config.jwt_secret.clone()))
            .wrap(Cors::permissive())
            .route("/auth/register", web::post().to(handlers::register))
            .route("/auth/login", web::post().to(handlers::login))
            .route("/products", web::get().to(handlers::list_products))
            .route("/products", web::post().to(handlers::create_product))
            .route("/products/{id}", web::put().to(handlers::update_product))
            .route("/products/{id}", web::delete().to(handlers::delete_product))
            .route("/cart", web::get().to(handlers::get_cart))
            .route("/cart", web::post().to(handlers::update_cart))
            .route("/cart/{product_id}", web::delete().to(handlers::remove_cart_item))
            .route("/orders", web::post().to(handlers::create_order))
            .route("/orders", web::get().to(handlers::list_orders))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
