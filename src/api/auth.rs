use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::api::session::{CurrentUser, Session};
use crate::api::shared::{ok_json, Message, ResponseType};
use crate::config::AppConfig;
use crate::db::models::{User, VideoWithMeta};
use crate::db::{queries, DbPool};
use crate::error::{AppError, Result};
use crate::services::{auth, captcha};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/captcha", web::get().to(captcha_image))
        .route("/register", web::post().to(register))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/me", web::get().to(me))
        .route("/password", web::post().to(change_password));
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    captcha: String,
}

#[derive(Deserialize, Debug)]
pub struct PasswordChange {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
    #[serde(default)]
    confirm_password: String,
}

#[derive(Serialize, Debug)]
pub struct Profile {
    pub user: User,
    pub videos: Vec<VideoWithMeta>,
}

pub async fn captcha_image(
    config: web::Data<AppConfig>,
    mut session: Session,
) -> Result<HttpResponse> {
    let text = captcha::random_text(config.captcha.length);
    let (width, height) = (config.captcha.width, config.captcha.height);

    let answer = text.clone();
    let png = web::block(move || captcha::render_png(&text, width, height)).await??;

    session.set_captcha(answer);
    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header(CacheControl(vec![
            CacheDirective::NoStore,
            CacheDirective::NoCache,
            CacheDirective::MustRevalidate,
            CacheDirective::MaxAge(0),
        ]))
        .cookie(session.cookie()?)
        .body(png))
}

// The answer is consumed whether or not it matches.
fn check_captcha(session: &mut Session, given: &str) -> Result<()> {
    let expected = session.take_captcha().unwrap_or_default();
    if captcha::matches(&expected, given) {
        Ok(())
    } else {
        Err(AppError::Validation("Incorrect CAPTCHA".into()))
    }
}

pub async fn register(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    form: web::Form<Credentials>,
    mut session: Session,
) -> Result<HttpResponse> {
    let outcome = register_user(&pool, &config, form.into_inner(), &mut session).await;
    session.respond(outcome)
}

async fn register_user(
    pool: &DbPool,
    config: &AppConfig,
    form: Credentials,
    session: &mut Session,
) -> Result<HttpResponse> {
    check_captcha(session, &form.captcha)?;

    let username = form.username.trim().to_string();
    auth::validate_username(&username)?;
    auth::validate_password(&form.password, config.auth.min_password_len)?;

    let mut conn = pool.get().await?;
    if queries::find_user_by_username(&mut conn, &username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Username already exists".into()));
    }

    let password = form.password;
    let password_hash = web::block(move || auth::hash_password(&password)).await??;
    let user = queries::create_user(&mut conn, &username, &password_hash).await?;

    log::info!("Registered user {} ({})", user.username, user.id);
    session.login(&user);
    Ok(HttpResponse::Created().json(ResponseType::ok(user)))
}

pub async fn login(
    pool: web::Data<DbPool>,
    form: web::Form<Credentials>,
    mut session: Session,
) -> Result<HttpResponse> {
    let outcome = login_user(&pool, form.into_inner(), &mut session).await;
    session.respond(outcome)
}

async fn login_user(
    pool: &DbPool,
    form: Credentials,
    session: &mut Session,
) -> Result<HttpResponse> {
    check_captcha(session, &form.captcha)?;

    let invalid = || AppError::Unauthorized("Invalid username or password".into());

    let mut conn = pool.get().await?;
    let user = queries::find_user_by_username(&mut conn, form.username.trim())
        .await?
        .ok_or_else(invalid)?;

    let password = form.password;
    let hash = user.password_hash.clone();
    if !web::block(move || auth::verify_password(&password, &hash)).await?? {
        return Err(invalid());
    }

    log::info!("User {} logged in", user.username);
    session.login(&user);
    Ok(ok_json(user))
}

pub async fn logout(mut session: Session) -> Result<HttpResponse> {
    session.clear();
    session.respond(Ok(ok_json(Message::new("Logged out"))))
}

pub async fn me(pool: web::Data<DbPool>, current: CurrentUser) -> Result<HttpResponse> {
    let mut conn = pool.get().await?;
    let user = queries::find_user(&mut conn, current.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;

    let videos = queries::videos_by_user(&mut conn, user.id)
        .await?
        .into_iter()
        .map(|v| VideoWithMeta::new(v, user.username.clone()))
        .collect();

    Ok(ok_json(Profile { user, videos }))
}

pub async fn change_password(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    form: web::Form<PasswordChange>,
    current: CurrentUser,
) -> Result<HttpResponse> {
    let PasswordChange {
        old_password,
        new_password,
        confirm_password,
    } = form.into_inner();

    if old_password.is_empty() || new_password.is_empty() || confirm_password.is_empty() {
        return Err(AppError::Validation("All fields are required".into()));
    }
    if new_password != confirm_password {
        return Err(AppError::Validation(
            "New password and confirmation do not match".into(),
        ));
    }
    auth::validate_password(&new_password, config.auth.min_password_len)?;

    let mut conn = pool.get().await?;
    let user = queries::find_user(&mut conn, current.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;

    let hash = user.password_hash;
    if !web::block(move || auth::verify_password(&old_password, &hash)).await?? {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let password_hash = web::block(move || auth::hash_password(&new_password)).await??;
    queries::update_password_hash(&mut conn, current.id, &password_hash).await?;

    log::info!("User {} changed their password", current.username);
    Ok(ok_json(Message::new("Password changed")))
}
