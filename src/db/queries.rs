use chrono::Utc;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;

use crate::db::models::{Comment, NewComment, NewUser, NewVideo, User, Video};
use crate::db::schema::{comments, users, videos};
use crate::db::DbConnection;
use crate::error::{AppError, Result};

// -- Users --

pub async fn create_user(
    conn: &mut DbConnection,
    username: &str,
    password_hash: &str,
) -> Result<User> {
    let new_user = NewUser {
        username,
        password_hash,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::Conflict("Username already exists".into())
            }
            other => AppError::Database(other),
        })
}

pub async fn find_user_by_username(conn: &mut DbConnection, username: &str) -> Result<Option<User>> {
    Ok(users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn find_user(conn: &mut DbConnection, user_id: i32) -> Result<Option<User>> {
    Ok(users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn update_password_hash(
    conn: &mut DbConnection,
    user_id: i32,
    password_hash: &str,
) -> Result<()> {
    let updated = diesel::update(users::table.find(user_id))
        .set(users::password_hash.eq(password_hash))
        .execute(conn)
        .await?;
    if updated == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(())
}

pub async fn all_usernames(conn: &mut DbConnection) -> Result<Vec<(i32, String)>> {
    Ok(users::table
        .select((users::id, users::username))
        .load(conn)
        .await?)
}

// -- Videos --

pub async fn insert_video(
    conn: &mut DbConnection,
    user_id: i32,
    title: &str,
    filename: &str,
) -> Result<Video> {
    let new_video = NewVideo {
        user_id,
        title,
        filename,
        created_at: Utc::now().naive_utc(),
    };

    Ok(diesel::insert_into(videos::table)
        .values(&new_video)
        .returning(Video::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn find_video(conn: &mut DbConnection, video_id: i32) -> Result<Option<(Video, String)>> {
    Ok(videos::table
        .inner_join(users::table)
        .filter(videos::id.eq(video_id))
        .select((Video::as_select(), users::username))
        .first(conn)
        .await
        .optional()?)
}

/// Newest first.
pub async fn videos_by_user(conn: &mut DbConnection, user_id: i32) -> Result<Vec<Video>> {
    Ok(videos::table
        .filter(videos::user_id.eq(user_id))
        .order_by(videos::id.desc())
        .select(Video::as_select())
        .load(conn)
        .await?)
}

/// The owner's next upload after `video_id`, by id.
pub async fn next_video_of_user(
    conn: &mut DbConnection,
    user_id: i32,
    video_id: i32,
) -> Result<Option<Video>> {
    Ok(videos::table
        .filter(videos::user_id.eq(user_id))
        .filter(videos::id.gt(video_id))
        .order_by(videos::id.asc())
        .select(Video::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn list_videos(
    conn: &mut DbConnection,
    offset: i64,
    limit: i64,
) -> Result<Vec<(Video, String)>> {
    Ok(videos::table
        .inner_join(users::table)
        .order_by(videos::id.desc())
        .offset(offset)
        .limit(limit)
        .select((Video::as_select(), users::username))
        .load(conn)
        .await?)
}

pub async fn count_videos(conn: &mut DbConnection) -> Result<i64> {
    Ok(videos::table.count().get_result(conn).await?)
}

pub async fn all_videos(conn: &mut DbConnection) -> Result<Vec<(Video, String)>> {
    Ok(videos::table
        .inner_join(users::table)
        .select((Video::as_select(), users::username))
        .load(conn)
        .await?)
}

pub async fn rename_video(conn: &mut DbConnection, video_id: i32, title: &str) -> Result<Video> {
    Ok(diesel::update(videos::table.find(video_id))
        .set(videos::title.eq(title))
        .returning(Video::as_returning())
        .get_result(conn)
        .await?)
}

/// Comments go with the row through ON DELETE CASCADE.
pub async fn delete_video(conn: &mut DbConnection, video_id: i32) -> Result<usize> {
    Ok(diesel::delete(videos::table.find(video_id))
        .execute(conn)
        .await?)
}

// -- Comments --

pub async fn find_comment(conn: &mut DbConnection, comment_id: i32) -> Result<Option<Comment>> {
    Ok(comments::table
        .find(comment_id)
        .select(Comment::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn insert_comment(
    conn: &mut DbConnection,
    video_id: i32,
    user_id: i32,
    parent_id: Option<i32>,
    content: &str,
) -> Result<Comment> {
    let new_comment = NewComment {
        video_id,
        user_id,
        parent_id,
        content,
        created_at: Utc::now().naive_utc(),
    };

    Ok(diesel::insert_into(comments::table)
        .values(&new_comment)
        .returning(Comment::as_returning())
        .get_result(conn)
        .await?)
}

/// Every comment on a video with its author's name, oldest first.
pub async fn comments_for_video(
    conn: &mut DbConnection,
    video_id: i32,
) -> Result<Vec<(Comment, String)>> {
    Ok(comments::table
        .inner_join(users::table)
        .filter(comments::video_id.eq(video_id))
        .order_by((comments::created_at.asc(), comments::id.asc()))
        .select((Comment::as_select(), users::username))
        .load(conn)
        .await?)
}
