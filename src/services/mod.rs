pub mod auth;
pub mod captcha;
pub mod comments;
pub mod storage;
