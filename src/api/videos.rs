use actix_files::NamedFile;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::session::CurrentUser;
use crate::api::shared::{ok_json, Message, ResponseType};
use crate::db::models::{Video, VideoWithMeta};
use crate::db::{queries, DbConnection, DbPool};
use crate::error::{AppError, Result};
use crate::services::comments::{build_tree, CommentNode};
use crate::services::storage::{StagedUpload, Storage};

const MAX_TITLE_CHARS: usize = 200;
const MAX_COMMENT_CHARS: usize = 2000;
const MAX_TEXT_FIELD_BYTES: usize = 4096;
const MAX_PER_PAGE: i64 = 100;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/videos")
            .route("", web::post().to(upload_video))
            .route("", web::get().to(list_videos))
            .route("/{id}", web::get().to(get_video))
            .route("/{id}", web::delete().to(delete_video))
            .route("/{id}/rename", web::post().to(rename_video))
            .route("/{id}/stream", web::get().to(stream_video))
            .route("/{id}/download", web::get().to(download_video))
            .route("/{id}/comments", web::post().to(add_comment)),
    );
}

#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    video: Option<StagedUpload>,
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Please enter a video title".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

async fn read_text(field: &mut Field) -> Result<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::Validation("Form field is too long".into()));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::Validation("Form field is not UTF-8".into()))
}

async fn read_fields(
    storage: &Storage,
    username: &str,
    payload: &mut Multipart,
    form: &mut UploadForm,
) -> Result<()> {
    while let Some(mut field) = payload.try_next().await? {
        let content_disposition = field
            .content_disposition()
            .cloned()
            .ok_or_else(|| AppError::Validation("Missing content disposition".into()))?;
        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| AppError::Validation("No field name".into()))?;

        match field_name {
            "video" => {
                if form.video.is_some() {
                    return Err(AppError::Validation("Upload one video at a time".into()));
                }
                let filename = content_disposition
                    .get_filename()
                    .filter(|f| !f.trim().is_empty())
                    .ok_or_else(|| AppError::Validation("Please choose a video file".into()))?;
                form.video = Some(storage.stage(username, filename, &mut field).await?);
            }
            "title" => {
                form.title = Some(read_text(&mut field).await?);
            }
            _ => {
                // Skip unknown fields
                while (field.try_next().await?).is_some() {}
            }
        }
    }
    Ok(())
}

pub async fn upload_video(
    mut payload: Multipart,
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let mut form = UploadForm::default();
    if let Err(e) = read_fields(&storage, &user.username, &mut payload, &mut form).await {
        if let Some(staged) = form.video.take() {
            storage.discard(staged).await;
        }
        return Err(e);
    }

    let title = validate_title(form.title.as_deref().unwrap_or_default());
    let (title, staged) = match (title, form.video) {
        (Ok(title), Some(staged)) => (title, staged),
        (Err(e), staged) => {
            if let Some(staged) = staged {
                storage.discard(staged).await;
            }
            return Err(e);
        }
        (Ok(_), None) => return Err(AppError::Validation("Please choose a video file".into())),
    };

    let size = staged.size;
    let filename = storage.commit(staged).await?;

    let mut conn = pool.get().await?;
    let video = match queries::insert_video(&mut conn, user.id, &title, &filename).await {
        Ok(video) => video,
        Err(e) => {
            storage.remove(&user.username, &filename).await;
            return Err(e);
        }
    };

    log::info!(
        "User {} uploaded video {} as {} ({} bytes)",
        user.username,
        video.id,
        filename,
        size
    );
    Ok(HttpResponse::Created().json(ResponseType::ok(VideoWithMeta::new(video, user.username))))
}

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_videos(
    query: web::Query<ListQueryParams>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse> {
    let mut conn = pool.get().await?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, MAX_PER_PAGE);
    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::Validation("Page number is too large".into()))?;

    let videos: Vec<VideoWithMeta> = queries::list_videos(&mut conn, offset, per_page)
        .await?
        .into_iter()
        .map(|(video, owner)| VideoWithMeta::new(video, owner))
        .collect();

    let total_count = queries::count_videos(&mut conn).await?;

    Ok(ok_json(json!({
        "videos": videos,
        "meta": {
            "total": total_count,
            "page": page,
            "per_page": per_page,
            "total_pages": (total_count as f64 / per_page as f64).ceil() as i64,
        }
    })))
}

#[derive(Debug, Serialize)]
pub struct VideoDetail {
    pub video: VideoWithMeta,
    pub next_video: Option<VideoWithMeta>,
    pub comments: Vec<CommentNode>,
}

async fn load_video(conn: &mut DbConnection, video_id: i32) -> Result<(Video, String)> {
    queries::find_video(conn, video_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".into()))
}

async fn load_owned_video(
    conn: &mut DbConnection,
    video_id: i32,
    user: &CurrentUser,
) -> Result<(Video, String)> {
    let (video, owner) = load_video(conn, video_id).await?;
    if video.user_id != user.id {
        return Err(AppError::Forbidden(
            "You do not have permission to modify this video".into(),
        ));
    }
    Ok((video, owner))
}

pub async fn get_video(path: web::Path<i32>, pool: web::Data<DbPool>) -> Result<HttpResponse> {
    let video_id = path.into_inner();
    let mut conn = pool.get().await?;

    let (video, owner) = load_video(&mut conn, video_id).await?;
    let next_video = queries::next_video_of_user(&mut conn, video.user_id, video.id)
        .await?
        .map(|next| VideoWithMeta::new(next, owner.clone()));
    let comments = build_tree(queries::comments_for_video(&mut conn, video.id).await?);

    Ok(ok_json(VideoDetail {
        video: VideoWithMeta::new(video, owner),
        next_video,
        comments,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RenameForm {
    #[serde(default)]
    title: String,
}

pub async fn rename_video(
    path: web::Path<i32>,
    form: web::Form<RenameForm>,
    pool: web::Data<DbPool>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let mut conn = pool.get().await?;
    let (video, owner) = load_owned_video(&mut conn, path.into_inner(), &user).await?;
    let title = validate_title(&form.title)?;

    let video = queries::rename_video(&mut conn, video.id, &title).await?;
    Ok(ok_json(VideoWithMeta::new(video, owner)))
}

pub async fn delete_video(
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let mut conn = pool.get().await?;
    let (video, owner) = load_owned_video(&mut conn, path.into_inner(), &user).await?;

    queries::delete_video(&mut conn, video.id).await?;
    storage.remove(&owner, &video.filename).await;

    log::info!("User {} deleted video {}", user.username, video.id);
    Ok(ok_json(Message::new(format!(
        "Video \"{}\" deleted",
        video.title
    ))))
}

async fn open_video_file(
    pool: &DbPool,
    storage: &Storage,
    video_id: i32,
) -> Result<(NamedFile, Video)> {
    let mut conn = pool.get().await?;
    let (video, owner) = load_video(&mut conn, video_id).await?;
    drop(conn);

    let path = storage.video_path(&owner, &video.filename);
    let file = NamedFile::open_async(&path).await.map_err(|e| {
        log::warn!("Video {} file {} unreadable: {}", video.id, path.display(), e);
        AppError::NotFound("Video file is missing".into())
    })?;
    Ok((file, video))
}

/// Serves the raw file; `NamedFile` takes care of ranges and conditional
/// requests.
pub async fn stream_video(
    req: HttpRequest,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
) -> Result<HttpResponse> {
    let (file, _) = open_video_file(&pool, &storage, path.into_inner()).await?;
    Ok(file.into_response(&req))
}

pub async fn download_video(
    req: HttpRequest,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
) -> Result<HttpResponse> {
    let (file, video) = open_video_file(&pool, &storage, path.into_inner()).await?;
    let file = file.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(video.filename)],
    });
    Ok(file.into_response(&req))
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    content: String,
    #[serde(default)]
    parent_id: Option<String>,
}

fn parse_parent_id(raw: Option<&str>) -> Result<Option<i32>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation("Invalid reply target".into())),
    }
}

pub async fn add_comment(
    path: web::Path<i32>,
    form: web::Form<CommentForm>,
    pool: web::Data<DbPool>,
    user: CurrentUser,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut conn = pool.get().await?;
    let (video, _) = load_video(&mut conn, path.into_inner()).await?;

    let content = form.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".into()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_CHARS
        )));
    }

    let parent_id = parse_parent_id(form.parent_id.as_deref())?;
    if let Some(parent_id) = parent_id {
        match queries::find_comment(&mut conn, parent_id).await? {
            Some(parent) if parent.video_id == video.id => {}
            _ => return Err(AppError::Validation("Invalid reply target".into())),
        }
    }

    let comment = queries::insert_comment(&mut conn, video.id, user.id, parent_id, content).await?;
    Ok(HttpResponse::Created().json(ResponseType::ok(CommentNode {
        id: comment.id,
        author: user.username,
        content: comment.content,
        created_at: comment.created_at,
        replies: Vec::new(),
    })))
}
