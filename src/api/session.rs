//! Cookie-backed sessions.
//!
//! The whole session is a small JSON document stored in a private
//! (encrypted and authenticated) cookie, so the pending CAPTCHA answer
//! never reaches the client in readable form. Handlers that change the
//! session must send the cookie back with [`Session::cookie`] or
//! [`Session::respond`].

use actix_web::cookie::{time::Duration, Cookie, CookieJar, Key, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::db::models::User;
use crate::error::{AppError, Result};

pub const COOKIE_NAME: &str = "vidshare_session";

/// Key and cookie attributes shared by every worker.
#[derive(Clone)]
pub struct SessionKey {
    key: Key,
    ttl: Duration,
    secure: bool,
}

impl SessionKey {
    pub fn from_config(auth: &AuthConfig) -> Self {
        let key = match auth.session_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Key::derive_from(secret.as_bytes()),
            None => {
                log::warn!("auth.session_secret is not set; sessions will not survive a restart");
                Key::generate()
            }
        };
        Self {
            key,
            ttl: Duration::seconds(auth.session_ttl_secs),
            secure: auth.cookie_secure,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
}

pub struct Session {
    state: SessionState,
    key: SessionKey,
}

impl Session {
    fn load(req: &HttpRequest) -> std::result::Result<Self, actix_web::Error> {
        let key = req
            .app_data::<web::Data<SessionKey>>()
            .ok_or_else(|| {
                log::error!("SessionKey is not registered as app data");
                actix_web::error::ErrorInternalServerError("Session unavailable")
            })?
            .get_ref()
            .clone();

        let state = req
            .cookie(COOKIE_NAME)
            .map(|c| open(&key, c))
            .unwrap_or_default();

        Ok(Self { state, key })
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        match (self.state.user_id, &self.state.username) {
            (Some(id), Some(username)) => Some(CurrentUser {
                id,
                username: username.clone(),
            }),
            _ => None,
        }
    }

    pub fn login(&mut self, user: &User) {
        self.state.user_id = Some(user.id);
        self.state.username = Some(user.username.clone());
    }

    pub fn clear(&mut self) {
        self.state = SessionState::default();
    }

    pub fn set_captcha(&mut self, text: String) {
        self.state.captcha = Some(text);
    }

    /// The pending answer, removed so it can be checked only once.
    pub fn take_captcha(&mut self) -> Option<String> {
        self.state.captcha.take()
    }

    /// The encrypted cookie carrying the current state.
    pub fn cookie(&self) -> Result<Cookie<'static>> {
        let value = serde_json::to_string(&self.state)?;
        let cookie = Cookie::build(COOKIE_NAME, value)
            .path("/")
            .http_only(true)
            .secure(self.key.secure)
            .same_site(SameSite::Lax)
            .max_age(self.key.ttl)
            .finish();

        let mut jar = CookieJar::new();
        jar.private_mut(&self.key.key).add(cookie);
        jar.get(COOKIE_NAME)
            .cloned()
            .ok_or_else(|| AppError::Internal("Session cookie was not sealed".into()))
    }

    /// Send the session back with `outcome`, error responses included,
    /// so that state consumed by a failed request stays consumed.
    pub fn respond(&self, outcome: Result<HttpResponse>) -> Result<HttpResponse> {
        let mut resp = outcome.unwrap_or_else(|e| e.error_response());
        resp.add_cookie(&self.cookie()?)
            .map_err(|e| AppError::Internal(format!("Failed to set session cookie: {}", e)))?;
        Ok(resp)
    }
}

/// Decrypt a session cookie. Anything tampered or unreadable is treated
/// as an empty session.
fn open(key: &SessionKey, cookie: Cookie<'static>) -> SessionState {
    let mut jar = CookieJar::new();
    jar.add_original(cookie);
    jar.private(&key.key)
        .get(COOKIE_NAME)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Session::load(req))
    }
}

/// The logged-in user; extraction fails with 401 for anonymous requests.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Session::load(req).and_then(|session| {
            session
                .current_user()
                .ok_or_else(|| AppError::Unauthorized("Please log in first".into()).into())
        }))
    }
}

#[cfg(test)]
pub(crate) fn read_cookie(key: &SessionKey, cookie: Cookie<'static>) -> SessionState {
    open(key, cookie)
}
