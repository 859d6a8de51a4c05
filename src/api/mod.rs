pub mod auth;
pub mod health;
pub mod search;
pub mod session;
pub mod shared;
pub mod users;
pub mod videos;


use actix_web::web;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::error::AppError;
use crate::services::storage::Storage;
use session::SessionKey;

/// Everything handlers pull out of app data, built once and shared by
/// every worker.
#[derive(Clone)]
pub struct AppState {
    pub config: web::Data<AppConfig>,
    pub pool: web::Data<DbPool>,
    pub storage: web::Data<Storage>,
    pub session_key: web::Data<SessionKey>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: DbPool) -> Self {
        let storage = Storage::new(&config.storage);
        let session_key = SessionKey::from_config(&config.auth);
        Self {
            config: web::Data::new(config),
            pool: web::Data::new(pool),
            storage: web::Data::new(storage),
            session_key: web::Data::new(session_key),
        }
    }

    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.config.clone())
            .app_data(self.pool.clone())
            .app_data(self.storage.clone())
            .app_data(self.session_key.clone());
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(web::FormConfig::default().error_handler(|err, _req| {
                AppError::Validation(err.to_string()).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::Validation(err.to_string()).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                AppError::NotFound(err.to_string()).into()
            }))
            .configure(health::configure)
            .configure(auth::configure)
            .configure(videos::configure)
            .configure(users::configure)
            .configure(search::configure),
    );
}
