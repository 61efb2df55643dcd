use crate::server::{ServerHandle, ServerStats};
use actix_web::{error, web, HttpResponse, Result};
use serde::Serialize;

pub fn configure_health_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/health")
            .name("health")
            .route(web::get().to(health)),
    );
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    status: &'static str,
    uptime_secs: u64,
    total_rooms: usize,
    total_users: usize,
    active_rooms: usize,
}

impl From<ServerStats> for HealthReport {
    fn from(stats: ServerStats) -> Self {
        Self {
            status: if stats.halted { "degraded" } else { "ok" },
            uptime_secs: stats.uptime.as_secs(),
            total_rooms: stats.registry.total_sessions,
            total_users: stats.registry.total_participants,
            active_rooms: stats.registry.active_sessions,
        }
    }
}

pub async fn health(server: web::Data<ServerHandle>) -> Result<HttpResponse> {
    let stats = server
        .stats()
        .await
        .map_err(|e| error::ErrorServiceUnavailable(e.to_string()))?;
    Ok(HttpResponse::Ok().json(HealthReport::from(stats)))
}
