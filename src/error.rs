use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Everything a handler can fail with. Each variant owns its status code;
/// the client-facing body is always `{"msg": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("Cart is empty")]
    EmptyCart,
    #[error("{0}")]
    Conflict(String),
    #[error("Server error")]
    Internal,
}

impl From<mongodb::error::Error> for ApiError {
    fn from(err: mongodb::error::Error) -> Self {
        // The cause stays in the log; clients only see the generic message.
        log::error!("database error: {err}");
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::EmptyCart => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "msg": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_variant_maps_to_its_status_code() {
        assert_eq!(
            ApiError::BadRequest("Missing fields".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("No token provided").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("Product not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Conflict("User exists".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn store_failures_do_not_leak_detail() {
        let err = ApiError::from(mongodb::error::Error::custom("connection reset by peer"));
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body.as_ref(), br#"{"msg":"Server error"}"#);
    }

    #[actix_web::test]
    async fn bodies_carry_the_message() {
        let resp = ApiError::EmptyCart.error_response();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body.as_ref(), br#"{"msg":"Cart is empty"}"#);
    }
}
