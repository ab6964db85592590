use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::order::{OrderCreateRequest, OrderStatus, StatusCommand};
use crate::store::{Page, Scope, Store};
use super::auth::{AdminUser, AuthUser};
use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: OrderStatus,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Path segment of an admin workflow route
fn parse_action(action: &str) -> Result<StatusCommand, ApiError> {
    match action {
        "confirm" => Ok(StatusCommand::Confirm),
        "process" => Ok(StatusCommand::StartProcessing),
        "ship" => Ok(StatusCommand::Ship),
        "deliver" => Ok(StatusCommand::Deliver),
        "refund" => Ok(StatusCommand::Refund),
        other => Err(ApiError::UnknownAction(other.to_string())),
    }
}

pub async fn list_orders<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = Page::new(query.offset, query.limit);
    let orders = state.orders.list_orders(user.0, page).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub async fn get_order<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let order = state.orders.get_order(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn checkout<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    body: web::Json<OrderCreateRequest>,
) -> Result<HttpResponse, ApiError> {
    let order = state.checkout.checkout(Scope::Root, user.0, &body).await?;
    Ok(HttpResponse::Created().json(order))
}

pub async fn cancel_order<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let order = state.orders.cancel(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn list_by_status<S: Store>(
    state: web::Data<AppState<S>>,
    _admin: AdminUser,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = Page::new(query.offset, query.limit);
    let orders = state.orders.list_orders_by_status(query.status, page).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub async fn apply_action<S: Store>(
    state: web::Data<AppState<S>>,
    admin: AdminUser,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse, ApiError> {
    let (order_id, action) = path.into_inner();
    let command = parse_action(&action)?;

    tracing::debug!(admin = %admin.0, order_id = %order_id, command = ?command, "Admin action");
    let order = state.orders.apply(order_id, command).await?;
    Ok(HttpResponse::Ok().json(order))
}
