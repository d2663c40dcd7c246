use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};

use super::AppState;
use crate::actors::{GetSystemHealth, HealthStatus};

const SERVICE_NAME: &str = "order-cache";
const ORDER_MAX_AGE: u32 = 120;

/// GET /orders/{id}
pub async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let order_uid = path.into_inner();

    match state.cache.get(&order_uid) {
        Some(order) => HttpResponse::Ok()
            .insert_header(CacheControl(vec![
                CacheDirective::Public,
                CacheDirective::MaxAge(ORDER_MAX_AGE),
            ]))
            .json(order),
        None => {
            tracing::debug!(order_uid = %order_uid, "Order not in cache");
            HttpResponse::NotFound().json(serde_json::json!({ "error": "order not found" }))
        }
    }
}

/// GET /orders
pub async fn list_orders(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.cache.get_all())
}

/// GET /health
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    let cache_size = state.cache.len();

    match state.health.send(GetSystemHealth).await {
        Ok(system) => {
            let body = serde_json::json!({
                "status": system.overall_status.label(),
                "service": SERVICE_NAME,
                "cache_size": cache_size,
                "components": system.components,
                "timestamp": system.check_time,
            });
            match system.overall_status {
                HealthStatus::Unhealthy(_) => HttpResponse::ServiceUnavailable().json(body),
                _ => HttpResponse::Ok().json(body),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": SERVICE_NAME,
                "cache_size": cache_size,
                "components": {},
                "timestamp": Utc::now(),
            }))
        }
    }
}

/// GET /metrics
pub async fn metrics(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}
