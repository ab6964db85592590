// Private module declarations
mod auth;
mod cart;
mod error;
mod orders;

use actix_web::{web, HttpResponse, Responder};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::cart::CartService;
use crate::domain::order::{CheckoutService, OrderService};
use crate::metrics::Metrics;
use crate::store::Store;

// Re-export for public API
pub use auth::{AdminUser, AuthUser, USER_ID_HEADER, USER_ROLE_HEADER};
pub use error::ApiError;

// ============================================================================
// HTTP API
// ============================================================================
//
//   /cart                          own cart
//   /orders                        own orders, checkout, cancel
//   /admin/orders                  listing by status, workflow steps
//   /health                        liveness
//
// Handlers are generic over the store so the same routes serve PostgreSQL
// in production and the in-memory store in tests.
//
// ============================================================================

/// Services shared by every worker
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, shipping_price: Decimal, metrics: Arc<Metrics>) -> Self {
        Self {
            carts: CartService::new(store.clone(), metrics.clone()),
            checkout: CheckoutService::new(store.clone(), shipping_price, metrics.clone()),
            orders: OrderService::new(store, metrics),
        }
    }
}

/// Register every route; the app must carry `web::Data<AppState<S>>`
pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::Malformed(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::Malformed(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| ApiError::Malformed(err.to_string()).into()),
    )
    .route("/health", web::get().to(health))
    .service(
        web::scope("/cart")
            .route("", web::get().to(cart::get_cart::<S>))
            .route("", web::delete().to(cart::clear_cart::<S>))
            .route("/items", web::post().to(cart::add_item::<S>))
            .route("/items/{product_id}", web::patch().to(cart::update_item::<S>))
            .route("/items/{product_id}", web::delete().to(cart::remove_item::<S>)),
    )
    .service(
        web::scope("/orders")
            .route("", web::get().to(orders::list_orders::<S>))
            .route("", web::post().to(orders::checkout::<S>))
            .route("/{order_id}", web::get().to(orders::get_order::<S>))
            .route("/{order_id}/cancel", web::post().to(orders::cancel_order::<S>)),
    )
    .service(
        web::scope("/admin/orders")
            .route("", web::get().to(orders::list_by_status::<S>))
            .route("/{order_id}/{action}", web::post().to(orders::apply_action::<S>)),
    );
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "shop-orders",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// HTTP Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Product;
    use crate::store::MemoryStore;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use uuid::Uuid;

    struct Fixture {
        data: web::Data<AppState<MemoryStore>>,
        product_a: Uuid,
        product_b: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let a = Product::new("Product A", dec!(10), 10);
        let b = Product::new("Product B", dec!(20), 10);
        let (product_a, product_b) = (a.id, b.id);
        store.seed_product(a).await;
        store.seed_product(b).await;

        let state = AppState::new(Arc::new(store), dec!(200), Arc::new(Metrics::new().unwrap()));
        Fixture {
            data: web::Data::new(state),
            product_a,
            product_b,
        }
    }

    fn address() -> Value {
        json!({
            "city": "Springfield",
            "postcode": 1500,
            "country": "Freedonia"
        })
    }

    #[actix_web::test]
    async fn test_health() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
    }

    #[actix_web::test]
    async fn test_requests_without_identity_are_rejected() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;

        let req = test::TestRequest::get().uri("/orders").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "unauthorized");
    }

    #[actix_web::test]
    async fn test_cart_to_order_flow() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;
        let user = Uuid::new_v4().to_string();

        for (product_id, quantity) in [(f.product_a, 4), (f.product_b, 2)] {
            let req = test::TestRequest::post()
                .uri("/cart/items")
                .insert_header((USER_ID_HEADER, user.as_str()))
                .set_json(json!({"product_id": product_id, "quantity": quantity}))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let req = test::TestRequest::get()
            .uri("/cart")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .to_request();
        let cart: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cart["items"].as_array().unwrap().len(), 2);
        assert_eq!(cart["total"], json!(80.0));

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .set_json(json!({"payment_method": "cash", "delivery_address": address()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let order: Value = test::read_body_json(resp).await;
        assert_eq!(order["order_status"], "pending");
        assert_eq!(order["payment_status"], "pending");
        assert_eq!(order["subtotal"], json!(80.0));
        assert_eq!(order["total"], json!(280.0));
        assert_eq!(order["order_items"].as_array().unwrap().len(), 2);

        let order_id = order["id"].as_str().unwrap().to_string();
        let req = test::TestRequest::get()
            .uri(&format!("/orders/{}", order_id))
            .insert_header((USER_ID_HEADER, user.as_str()))
            .to_request();
        let fetched: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched["id"], order_id.as_str());

        let req = test::TestRequest::get()
            .uri("/orders?limit=500")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // The cart was emptied by the checkout
        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .set_json(json!({"payment_method": "cash", "delivery_address": address()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "empty_cart");
    }

    #[actix_web::test]
    async fn test_other_users_order_is_not_found() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;
        let owner = Uuid::new_v4();
        f.data.carts.add_item(owner, f.product_a, 1).await.unwrap();

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, owner.to_string()))
            .set_json(json!({"payment_method": "cash", "delivery_address": address()}))
            .to_request();
        let order: Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::get()
            .uri(&format!("/orders/{}", order["id"].as_str().unwrap()))
            .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "not_found");
    }

    #[actix_web::test]
    async fn test_card_checkout_is_unavailable() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;
        let user = Uuid::new_v4();
        f.data.carts.add_item(user, f.product_a, 1).await.unwrap();

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, user.to_string()))
            .set_json(json!({"payment_method": "card", "delivery_address": address()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "payment_unavailable");

        // Cart survives the rolled back checkout
        assert_eq!(f.data.carts.get_cart(user).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_cart_rejects_quantity_above_stock() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;

        let req = test::TestRequest::post()
            .uri("/cart/items")
            .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .set_json(json!({"product_id": f.product_a, "quantity": 11}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "exceeds_available");
        assert_eq!(body["available"], 10);
        assert_eq!(body["requested"], 11);
    }

    #[actix_web::test]
    async fn test_malformed_checkout_body() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .set_json(json!({"payment_method": "barter"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "validation_error");
    }

    #[actix_web::test]
    async fn test_malformed_path_id() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;
        let user = Uuid::new_v4().to_string();

        let req = test::TestRequest::get()
            .uri("/orders/not-a-uuid")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "validation_error");

        let req = test::TestRequest::delete()
            .uri("/cart/items/42")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let req = test::TestRequest::post()
            .uri("/admin/orders/not-a-uuid/confirm")
            .insert_header((USER_ID_HEADER, user.as_str()))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "validation_error");
    }

    #[actix_web::test]
    async fn test_admin_workflow() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4().to_string();
        f.data.carts.add_item(user, f.product_b, 1).await.unwrap();

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, user.to_string()))
            .set_json(json!({"payment_method": "cash", "delivery_address": address()}))
            .to_request();
        let order: Value = test::call_and_read_body_json(&app, req).await;
        let confirm_uri = format!("/admin/orders/{}/confirm", order["id"].as_str().unwrap());

        // Plain users may not drive the workflow
        let req = test::TestRequest::post()
            .uri(&confirm_uri)
            .insert_header((USER_ID_HEADER, user.to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri(&confirm_uri)
            .insert_header((USER_ID_HEADER, admin.as_str()))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let confirmed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(confirmed["order_status"], "confirmed");

        let req = test::TestRequest::post()
            .uri(&confirm_uri)
            .insert_header((USER_ID_HEADER, admin.as_str()))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["actual"], "confirmed");
        assert_eq!(body["expected"], json!(["pending"]));

        let req = test::TestRequest::get()
            .uri("/admin/orders?status=confirmed")
            .insert_header((USER_ID_HEADER, admin.as_str()))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri(&format!("/admin/orders/{}/teleport", order["id"].as_str().unwrap()))
            .insert_header((USER_ID_HEADER, admin.as_str()))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_cancel_own_order() {
        let f = fixture().await;
        let app = test::init_service(App::new().app_data(f.data.clone()).configure(configure::<MemoryStore>)).await;
        let user = Uuid::new_v4();
        f.data.carts.add_item(user, f.product_a, 2).await.unwrap();

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((USER_ID_HEADER, user.to_string()))
            .set_json(json!({"payment_method": "cash", "delivery_address": address()}))
            .to_request();
        let order: Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri(&format!("/orders/{}/cancel", order["id"].as_str().unwrap()))
            .insert_header((USER_ID_HEADER, user.to_string()))
            .to_request();
        let cancelled: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cancelled["order_status"], "cancelled");
        assert_eq!(cancelled["payment_status"], "failed");
    }
}
