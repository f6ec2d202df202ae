//! REST API server example for the marketplace engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /products` - Register a product's stock record
//! - `GET /products` - List product stock
//! - `GET /products/{id}` - Get stock for one product
//! - `POST /inventory/events` - Record an inventory event
//! - `GET /inventory/events/{product_id}` - Journal entries for a product
//! - `POST /orders` - Create an order (places best-effort stock holds)
//! - `GET /orders` - List orders (customer/status filters, paging)
//! - `GET /orders/{id}` / `PATCH /orders/{id}` / `DELETE /orders/{id}`
//! - `POST /reservations` - Place an ad hoc hold
//! - `GET /reservations/{id}` / `POST /reservations/{id}/release`
//! - `POST /reservations/sweep` - Release expired holds now
//! - `POST /coupons` / `GET /coupons` / `POST /coupons/validate`
//! - `POST /coupons/{code}/redeem`
//! - `POST /payments` / `GET /payments/{order_id}`
//! - `POST /payments/webhook` - Gateway webhook (signed or fallback JSON)
//!
//! A background task sweeps expired reservations every 60 seconds.
//!
//! ## Example Usage
//!
//! ```bash
//! # Register stock
//! curl -X POST http://localhost:3000/products \
//!   -H "Content-Type: application/json" \
//!   -d '{"product_id": 1, "stock": 10}'
//!
//! # Place an order
//! curl -X POST http://localhost:3000/orders \
//!   -H "Content-Type: application/json" \
//!   -d '{"customer_id": 7, "total_cents": 1000, "items": [
//!         {"product_id": 1, "vendor_id": null, "title": null,
//!          "variant_sku": null, "unit_price_cents": 500, "quantity": 2}]}'
//!
//! # Deliver the paid webhook (fallback JSON shape)
//! curl -X POST http://localhost:3000/payments/webhook \
//!   -H "Content-Type: application/json" \
//!   -d '{"orderId": 1, "status": "PAID", "transactionRef": "tx_1"}'
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use marketplace_engine_rs::{
    Coupon, Engine, EventKind, MarketError, NewOrder, OrderId, OrderStatus, PaymentMethod,
    PaymentUpdate, ProductId, ReservationId, SessionId, Sku, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub product_id: u32,
    pub stock: i64,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub product: u32,
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub product_id: u32,
    pub variant_sku: Option<String>,
    pub kind: EventKind,
    pub quantity: i64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub product_id: u32,
    pub variant_sku: Option<String>,
    pub user_id: Option<u32>,
    pub order_id: Option<u64>,
    pub session_id: Option<u64>,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<u32>,
    pub status: Option<OrderStatus>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ListCouponsQuery {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub total_cents: i64,
    pub category_slugs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: u64,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub released: usize,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub used_count: u32,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the engine and webhook secret.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub webhook_secret: Option<String>,
}

// === Error Handling ===

/// Wrapper for converting `MarketError` into HTTP responses.
pub struct AppError(MarketError);

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            MarketError::InvalidQuantity => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
            MarketError::EmptyOrder => (StatusCode::BAD_REQUEST, "EMPTY_ORDER"),
            MarketError::NegativeStock => (StatusCode::BAD_REQUEST, "NEGATIVE_STOCK"),
            MarketError::DuplicateProduct => (StatusCode::CONFLICT, "DUPLICATE_PRODUCT"),
            MarketError::ProductNotFound => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
            MarketError::OrderNotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            MarketError::ReservationNotFound => (StatusCode::NOT_FOUND, "RESERVATION_NOT_FOUND"),
            MarketError::ReservationClosed => (StatusCode::CONFLICT, "RESERVATION_CLOSED"),
            MarketError::PaymentNotFound => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
            MarketError::DuplicateCoupon => (StatusCode::CONFLICT, "DUPLICATE_COUPON"),
            MarketError::CouponNotFound => (StatusCode::NOT_FOUND, "COUPON_NOT_FOUND"),
            MarketError::MissingWebhookSecret => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MISSING_WEBHOOK_SECRET")
            }
            MarketError::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
            MarketError::MalformedPayload => (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn not_found(code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not found".to_string(),
            code: code.to_string(),
        }),
    )
}

// === Handlers: products and inventory ===

async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .add_product(ProductId(request.product_id), request.stock)?;
    Ok(StatusCode::CREATED)
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<StockResponse>> {
    let products: Vec<StockResponse> = state
        .engine
        .products()
        .map(|entry| StockResponse {
            product: entry.key().0,
            stock: entry.value().stock(),
        })
        .collect();
    Json(products)
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<StockResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .product_stock(&ProductId(id))
        .map(|stock| Json(StockResponse { product: id, stock }))
        .ok_or_else(|| not_found("PRODUCT_NOT_FOUND"))
}

async fn create_inventory_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<marketplace_engine_rs::InventoryEvent>), AppError> {
    let event = state.engine.record_stock_event(
        ProductId(request.product_id),
        request.variant_sku.map(Sku),
        request.kind,
        request.quantity,
        request.note,
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(event.as_ref().clone())))
}

async fn list_inventory_events(
    State(state): State<AppState>,
    Path(product_id): Path<u32>,
) -> Json<Vec<marketplace_engine_rs::InventoryEvent>> {
    let events = state
        .engine
        .journal()
        .for_product(ProductId(product_id))
        .iter()
        .map(|e| e.as_ref().clone())
        .collect();
    Json(events)
}

// === Handlers: orders ===

async fn create_order(
    State(state): State<AppState>,
    Json(new_order): Json<NewOrder>,
) -> Result<(StatusCode, Json<marketplace_engine_rs::OrderSnapshot>), AppError> {
    let order = state.engine.create_order(new_order, Utc::now())?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<marketplace_engine_rs::OrderSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_order(&OrderId(id))
        .map(Json)
        .ok_or_else(|| not_found("ORDER_NOT_FOUND"))
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<marketplace_engine_rs::OrderSnapshot>> {
    let orders = state.engine.list_orders(
        query.customer_id.map(UserId),
        query.status,
        query.page.unwrap_or(1),
        query.limit.unwrap_or(20),
    );
    Json(orders)
}

async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<marketplace_engine_rs::OrderSnapshot>, AppError> {
    let order = state
        .engine
        .update_order_status(OrderId(id), request.status)?;
    Ok(Json(order))
}

async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.engine.delete_order(OrderId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// === Handlers: reservations ===

async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<marketplace_engine_rs::ReservationSnapshot>), AppError> {
    let reservation = state.engine.reserve(
        ProductId(request.product_id),
        request.variant_sku.map(Sku),
        request.user_id.map(UserId),
        request.order_id.map(OrderId),
        request.session_id.map(SessionId),
        request.quantity,
        request.expires_at,
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<marketplace_engine_rs::ReservationSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_reservation(&ReservationId(id))
        .map(Json)
        .ok_or_else(|| not_found("RESERVATION_NOT_FOUND"))
}

async fn release_reservation(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<marketplace_engine_rs::ReservationSnapshot>, AppError> {
    let reservation = state
        .engine
        .release_reservation(ReservationId(id), Utc::now())?;
    Ok(Json(reservation))
}

async fn sweep_reservations(State(state): State<AppState>) -> Json<SweepResponse> {
    let released = state.engine.sweep_expired(Utc::now());
    Json(SweepResponse { released })
}

// === Handlers: coupons ===

async fn create_coupon(
    State(state): State<AppState>,
    Json(coupon): Json<Coupon>,
) -> Result<StatusCode, AppError> {
    state.engine.add_coupon(coupon)?;
    Ok(StatusCode::CREATED)
}

async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<ListCouponsQuery>,
) -> Json<Vec<Coupon>> {
    Json(state.engine.list_coupons(query.active))
}

async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Json<marketplace_engine_rs::CouponVerdict> {
    let verdict = state.engine.validate_coupon(
        &request.code,
        request.total_cents,
        &request.category_slugs.unwrap_or_default(),
        Utc::now(),
    );
    Json(verdict)
}

async fn redeem_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RedeemResponse>, AppError> {
    let used_count = state.engine.redeem_coupon(&code)?;
    Ok(Json(RedeemResponse { used_count }))
}

// === Handlers: payments ===

async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<marketplace_engine_rs::PaymentSnapshot>), AppError> {
    let payment = state.engine.create_payment(
        OrderId(request.order_id),
        request.method,
        request.amount_cents,
        request.currency.as_deref().unwrap_or("USD"),
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
) -> Result<Json<marketplace_engine_rs::PaymentSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_payment(&OrderId(order_id))
        .map(Json)
        .ok_or_else(|| not_found("PAYMENT_NOT_FOUND"))
}

/// Gateway webhook entry point.
///
/// A signed raw payload (with the `x-webhook-signature` header) is
/// verified before anything is trusted; without the header the body is
/// parsed as the fallback JSON shape.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(signature) = headers.get("x-webhook-signature") {
        let signature = signature.to_str().map_err(|_| MarketError::InvalidSignature)?;
        let secret = state.webhook_secret.as_deref().unwrap_or("");
        let outcome = state
            .engine
            .handle_signed_webhook(&body, signature, secret, Utc::now())?;
        return Ok(Json(serde_json::to_value(outcome).unwrap_or_default()));
    }

    let update: PaymentUpdate =
        serde_json::from_slice(&body).map_err(|_| MarketError::MalformedPayload)?;
    let payment = state.engine.handle_payment_update(update, Utc::now())?;
    Ok(Json(serde_json::to_value(payment).unwrap_or_default()))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/products", post(create_product).get(list_products))
        .route("/products/{id}", get(get_product))
        .route("/inventory/events", post(create_inventory_event))
        .route("/inventory/events/{product_id}", get(list_inventory_events))
        .route("/orders", post(create_order).get(list_orders))
        .route(
            "/orders/{id}",
            get(get_order).patch(update_order).delete(delete_order),
        )
        .route("/reservations", post(create_reservation))
        .route("/reservations/sweep", post(sweep_reservations))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/release", post(release_reservation))
        .route("/coupons", post(create_coupon).get(list_coupons))
        .route("/coupons/validate", post(validate_coupon))
        .route("/coupons/{code}/redeem", post(redeem_coupon))
        .route("/payments", post(create_payment))
        .route("/payments/webhook", post(payment_webhook))
        .route("/payments/{order_id}", get(get_payment))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
        webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
    };

    // Background sweep reclaiming expired holds, like the deployment cron.
    let sweeper = Arc::clone(&state.engine);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let released = sweeper.sweep_expired(Utc::now());
            if released > 0 {
                tracing::info!(released, "expiry sweep released holds");
            }
        }
    });

    let app = create_router(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await.unwrap();
    println!("Marketplace API server running on http://{addr}");
    println!();
    println!("Endpoints:");
    println!("  POST /products            - Register product stock");
    println!("  POST /orders              - Create an order");
    println!("  POST /payments/webhook    - Gateway webhook");
    println!("  POST /coupons/validate    - Validate a coupon");
    println!("  POST /reservations/sweep  - Release expired holds");

    axum::serve(listener, app).await.unwrap();
}
