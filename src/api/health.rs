use actix_web::{web, HttpResponse};
use diesel_async::SimpleAsyncConnection;

use crate::db::DbPool;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)));
}

async fn health_check(pool: web::Data<DbPool>) -> HttpResponse {
    let database = match pool.get().await {
        Ok(mut conn) => match conn.batch_execute("SELECT 1").await {
            Ok(()) => "ok",
            Err(e) => {
                log::warn!("Health check query failed: {}", e);
                "error"
            }
        },
        Err(e) => {
            log::warn!("Health check could not get a connection: {}", e);
            "unavailable"
        }
    };

    let body = serde_json::json!({
        "status": if database == "ok" { "ok" } else { "degraded" },
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    if database == "ok" {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
