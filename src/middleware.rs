use std::rc::Rc;

use actix_service::{forward_ready, Service};
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::error::ApiError;
use crate::models::{AuthedUser, Claims, User};

const TOKEN_TTL_DAYS: i64 = 1;

/// Signs a token for a freshly authenticated user.
pub fn issue_token(user: &User, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expires = chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS);
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role,
        exp: expires.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
}

/// Verifies `Authorization: Bearer` tokens and stores the principal in the
/// request extensions. Requests without the header pass through untouched —
/// handlers decide whether an anonymous caller is acceptable — while a header
/// that is present but malformed or unverifiable is rejected outright.
pub struct AuthMiddleware {
    secret: String,
}

impl AuthMiddleware {
    pub fn new(secret: String) -> Self {
        AuthMiddleware { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let secret = self.secret.clone();
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let Some(header) = req.headers().get("Authorization").cloned() else {
                return service.call(req).await;
            };
            let Ok(value) = header.to_str() else {
                return Err(ApiError::Unauthorized("Invalid authorization header").into());
            };
            let Some(token) = value.strip_prefix("Bearer ") else {
                return Err(ApiError::Unauthorized("Invalid authorization scheme").into());
            };

            match verify_token(token, &secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(AuthedUser {
                        id: claims.sub,
                        role: claims.role,
                    });
                    service.call(req).await
                }
                Err(_) => Err(ApiError::Unauthorized("Invalid token").into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpRequest, HttpResponse, ResponseError};

    fn test_user() -> User {
        User {
            id: "u-1".to_string(),
            username: "ada".to_string(),
            password: String::new(),
            role: Role::Admin,
        }
    }

    #[::core::prelude::v1::test]
    fn token_round_trip_preserves_subject_and_role() {
        let token = issue_token(&test_user(), "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, Role::Admin);
    }

    #[::core::prelude::v1::test]
    fn verify_rejects_wrong_secret_and_garbage() {
        let token = issue_token(&test_user(), "secret").unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
        assert!(verify_token("not-a-token", "secret").is_err());
    }

    #[::core::prelude::v1::test]
    fn verify_rejects_expired_tokens() {
        let claims = Claims {
            sub: "u-1".to_string(),
            role: Role::Customer,
            exp: 1_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(verify_token(&token, "secret").is_err());
    }

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match req.extensions().get::<AuthedUser>() {
            Some(user) => HttpResponse::Ok().body(user.id.clone()),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    macro_rules! guarded_app {
        () => {
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new("secret".to_string()))
                    .route("/", web::get().to(whoami)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn anonymous_requests_pass_through() {
        let app = guarded_app!();
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        assert_eq!(test::read_body(resp).await, "anonymous");
    }

    #[actix_web::test]
    async fn valid_bearer_populates_the_principal() {
        let token = issue_token(&test_user(), "secret").unwrap();
        let app = guarded_app!();
        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(test::read_body(resp).await, "u-1");
    }

    #[actix_web::test]
    async fn malformed_bearer_is_rejected() {
        let app = guarded_app!();
        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Authorization", "Bearer junk"))
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn non_bearer_scheme_is_rejected() {
        let app = guarded_app!();
        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
