use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::{json, Map, Value};

use crate::domain::cart::CartError;
use crate::domain::order::OrderError;

// ============================================================================
// Error -> Response Mapping
// ============================================================================
//
// Every error body is `{"code": ..., "detail": ...}` plus variant specific
// fields. Internal failures are logged here and answered with a generic
// detail; their cause never reaches the client.
//
// ============================================================================

const INTERNAL_DETAIL: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Missing or invalid user identity")]
    Unauthorized,

    #[error("Administrator role required")]
    Forbidden,

    #[error("Unknown order action: {0}")]
    UnknownAction(String),

    #[error("Malformed request: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Order(e) => e.code(),
            ApiError::Cart(e) => match e {
                CartError::ProductNotFound(_) => "product_not_found",
                CartError::OutOfStock(_) => "out_of_stock",
                CartError::ExceedsAvailable { .. } => "exceeds_available",
                CartError::ItemNotFound(_) => "item_not_found",
                CartError::InvalidQuantity(_) => "validation_error",
                CartError::Store(_) => "internal_error",
            },
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::UnknownAction(_) => "not_found",
            ApiError::Malformed(_) => "validation_error",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Order(OrderError::Store(_)) | ApiError::Cart(CartError::Store(_))
        )
    }

    /// Variant specific fields merged into the body
    fn extra_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match self {
            ApiError::Order(OrderError::InsufficientStock { product_id }) => {
                fields.insert("product_id".into(), json!(product_id));
            }
            ApiError::Order(OrderError::InvalidTransition { actual, expected }) => {
                fields.insert("actual".into(), json!(actual));
                fields.insert("expected".into(), json!(expected));
            }
            ApiError::Cart(CartError::ExceedsAvailable { available, requested }) => {
                fields.insert("available".into(), json!(available));
                fields.insert("requested".into(), json!(requested));
            }
            ApiError::Cart(CartError::OutOfStock(product_id)) => {
                fields.insert("product_id".into(), json!(product_id));
            }
            _ => {}
        }
        fields
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Order(e) => match e {
                OrderError::EmptyCart | OrderError::NotFound(_) | OrderError::NoOrders => {
                    StatusCode::NOT_FOUND
                }
                OrderError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
                OrderError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OrderError::PaymentUnavailable(_) | OrderError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Cart(e) => match e {
                CartError::ProductNotFound(_) | CartError::ItemNotFound(_) => StatusCode::NOT_FOUND,
                CartError::OutOfStock(_) | CartError::ExceedsAvailable { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CartError::InvalidQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CartError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::UnknownAction(_) => StatusCode::NOT_FOUND,
            ApiError::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = if self.is_internal() {
            tracing::error!(error = %self, "Request failed with internal error");
            INTERNAL_DETAIL.to_string()
        } else {
            self.to_string()
        };

        let mut body = self.extra_fields();
        body.insert("code".into(), json!(self.code()));
        body.insert("detail".into(), json!(detail));

        HttpResponse::build(self.status_code()).json(Value::Object(body))
    }
}
