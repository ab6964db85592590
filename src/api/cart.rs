use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::cart::{AddCartItem, CartLine, UpdateCartItem};
use crate::store::Store;
use super::auth::AuthUser;
use super::error::ApiError;
use super::AppState;

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLine>,
    pub total: Decimal,
}

impl From<Vec<CartLine>> for CartResponse {
    fn from(items: Vec<CartLine>) -> Self {
        let total = items.iter().map(CartLine::line_total).sum();
        Self { items, total }
    }
}

pub async fn get_cart<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let lines = state.carts.get_cart(user.0).await?;
    Ok(HttpResponse::Ok().json(CartResponse::from(lines)))
}

pub async fn add_item<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    body: web::Json<AddCartItem>,
) -> Result<HttpResponse, ApiError> {
    let lines = state
        .carts
        .add_item(user.0, body.product_id, body.quantity)
        .await?;
    Ok(HttpResponse::Created().json(CartResponse::from(lines)))
}

pub async fn update_item<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateCartItem>,
) -> Result<HttpResponse, ApiError> {
    let lines = state
        .carts
        .update_quantity(user.0, path.into_inner(), body.quantity)
        .await?;
    Ok(HttpResponse::Ok().json(CartResponse::from(lines)))
}

pub async fn remove_item<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let lines = state.carts.remove_item(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(CartResponse::from(lines)))
}

pub async fn clear_cart<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    state.carts.clear(user.0).await?;
    Ok(HttpResponse::NoContent().finish())
}
