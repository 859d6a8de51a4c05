use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::{comments, users, videos};

#[derive(Debug, Serialize, Queryable, Selectable, Identifiable, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Queryable, Selectable, Identifiable, Associations, Clone)]
#[diesel(table_name = videos)]
#[diesel(belongs_to(User))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Video {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub filename: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = videos)]
pub struct NewVideo<'a> {
    pub user_id: i32,
    pub title: &'a str,
    pub filename: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Queryable, Selectable, Identifiable, Associations, Clone)]
#[diesel(table_name = comments)]
#[diesel(belongs_to(Video))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Comment {
    pub id: i32,
    pub video_id: i32,
    pub user_id: i32,
    pub parent_id: Option<i32>,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment<'a> {
    pub video_id: i32,
    pub user_id: i32,
    pub parent_id: Option<i32>,
    pub content: &'a str,
    pub created_at: NaiveDateTime,
}

/// A video as listed to clients, with the owner's name and media URLs.
#[derive(Debug, Serialize)]
pub struct VideoWithMeta {
    #[serde(flatten)]
    pub video: Video,
    pub owner: String,
    pub stream_url: String,
    pub download_url: String,
}

impl VideoWithMeta {
    pub fn new(video: Video, owner: String) -> Self {
        let stream_url = format!("/api/v1/videos/{}/stream", video.id);
        let download_url = format!("/api/v1/videos/{}/download", video.id);
        Self {
            video,
            owner,
            stream_url,
            download_url,
        }
    }
}
