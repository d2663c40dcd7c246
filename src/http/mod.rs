use actix::Addr;
use actix_web::dev::Server;
use actix_web::middleware::{Compress, Logger};
use actix_web::{web, App, HttpServer};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::actors::HealthMonitorActor;
use crate::cache::OrderCache;
use crate::metrics::Metrics;

mod handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<OrderCache>,
    pub metrics: Arc<Metrics>,
    pub health: Addr<HealthMonitorActor>,
}

/// Register the read-only routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::get().to(handlers::list_orders))
        .route("/orders/{id}", web::get().to(handlers::get_order))
        .route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics));
}

/// Bind the HTTP server. The returned future runs until the server stops.
pub fn server(addr: SocketAddr, state: AppState) -> std::io::Result<Server> {
    tracing::info!(addr = %addr, "Starting HTTP server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Compress::default())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(addr)?
    .run();

    Ok(server)
}
