//! Auth extractors: optional JWT for realtime upgrades, app key for server-to-server pushes.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;
use std::collections::HashMap;
use tracing::debug;

use crate::error::AppError;
use crate::handlers::http::AppState;

const HEADER_APP_KEY: &str = "x-app-key";
const TOKEN_PARAM: &str = "token";
const TOKEN_COOKIE: &str = "token";

/// User id proven by a token at upgrade time, if one was presented.
///
/// A present but invalid token is rejected. A missing token is only rejected
/// when the server requires authentication.
#[derive(Clone, Debug)]
pub struct TokenUser(pub Option<String>);

#[axum::async_trait]
impl FromRequestParts<AppState> for TokenUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let from_query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(params)| params.get(TOKEN_PARAM).cloned());
        let token = from_query.or_else(|| {
            CookieJar::from_headers(&parts.headers)
                .get(TOKEN_COOKIE)
                .map(|c| c.value().to_string())
        });

        match token {
            Some(token) => {
                let user_id = state.jwt_secret().validate(&token)?;
                Ok(TokenUser(Some(user_id)))
            }
            None if state.require_auth => {
                debug!("rejected upgrade: token required");
                Err(AppError::Auth("token required".to_string()))
            }
            None => Ok(TokenUser(None)),
        }
    }
}

/// Guard for server-to-server endpoints: `x-app-key` must equal the configured key.
#[derive(Clone, Copy, Debug)]
pub struct AppKey;

#[axum::async_trait]
impl FromRequestParts<AppState> for AppKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(HEADER_APP_KEY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if key.is_empty() || key != state.app_key {
            debug!("rejected request: invalid or missing x-app-key");
            return Err(AppError::Auth("invalid or missing x-app-key".to_string()));
        }
        Ok(AppKey)
    }
}
