use actix_web::{web, HttpResponse};

use crate::api::auth::Profile;
use crate::api::search::SearchQuery;
use crate::api::shared::ok_json;
use crate::config::AppConfig;
use crate::db::models::VideoWithMeta;
use crate::db::{queries, DbPool};
use crate::error::{AppError, Result};
use crate::search::rank_by;
use crate::services::auth::is_valid_username;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/users/{username}", web::get().to(user_videos));
}

/// Public listing of one user's uploads, newest first. With `q`, only the
/// uploads matching it, best match first.
pub async fn user_videos(
    path: web::Path<String>,
    query: web::Query<SearchQuery>,
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse> {
    let username = path.into_inner();
    let not_found = || AppError::NotFound("User not found".into());
    if !is_valid_username(&username) {
        return Err(not_found());
    }

    let mut conn = pool.get().await?;
    let user = queries::find_user_by_username(&mut conn, &username)
        .await?
        .ok_or_else(not_found)?;
    let mut videos = queries::videos_by_user(&mut conn, user.id).await?;

    let keyword = query.q.trim();
    if !keyword.is_empty() {
        videos = rank_by(keyword, videos, &config.search.rank_options(), |v| {
            vec![v.title.as_str(), v.filename.as_str()]
        })
        .into_iter()
        .map(|m| m.item)
        .collect();
    }

    let videos = videos
        .into_iter()
        .map(|v| VideoWithMeta::new(v, user.username.clone()))
        .collect();

    Ok(ok_json(Profile { user, videos }))
}
