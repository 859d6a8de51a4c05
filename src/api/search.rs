use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::api::shared::ok_json;
use crate::config::AppConfig;
use crate::db::models::VideoWithMeta;
use crate::db::{queries, DbPool};
use crate::error::Result;
use crate::search::rank_by;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/search")
            .route("", web::get().to(search_users))
            .route("/videos", web::get().to(search_videos)),
    );
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResults<T> {
    pub query: String,
    pub results: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct UserHit {
    pub id: i32,
    pub username: String,
    pub score: usize,
}

#[derive(Debug, Serialize)]
pub struct VideoHit {
    pub score: usize,
    #[serde(flatten)]
    pub video: VideoWithMeta,
}

/// Usernames ranked by LCS similarity to `q`.
pub async fn search_users(
    query: web::Query<SearchQuery>,
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse> {
    let q = query.into_inner().q.trim().to_string();
    if q.is_empty() {
        return Ok(ok_json(SearchResults::<UserHit> {
            query: q,
            results: Vec::new(),
        }));
    }

    let mut conn = pool.get().await?;
    let users = queries::all_usernames(&mut conn).await?;

    let results = rank_by(&q, users, &config.search.rank_options(), |(_, name)| {
        vec![name.as_str()]
    })
    .into_iter()
    .map(|m| UserHit {
        id: m.item.0,
        username: m.item.1,
        score: m.score,
    })
    .collect();

    Ok(ok_json(SearchResults { query: q, results }))
}

/// Videos ranked by the better of their title and stored filename.
pub async fn search_videos(
    query: web::Query<SearchQuery>,
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse> {
    let q = query.into_inner().q.trim().to_string();
    if q.is_empty() {
        return Ok(ok_json(SearchResults::<VideoHit> {
            query: q,
            results: Vec::new(),
        }));
    }

    let mut conn = pool.get().await?;
    let videos = queries::all_videos(&mut conn).await?;

    let results = rank_by(&q, videos, &config.search.rank_options(), |(video, _)| {
        vec![video.title.as_str(), video.filename.as_str()]
    })
    .into_iter()
    .map(|m| {
        let (video, owner) = m.item;
        VideoHit {
            score: m.score,
            video: VideoWithMeta::new(video, owner),
        }
    })
    .collect();

    Ok(ok_json(SearchResults { query: q, results }))
}
