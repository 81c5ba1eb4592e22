use serde::Deserialize;
use spin_sdk::http::{Method, Request, Response};
use uuid::Uuid;

use crate::config::Settings;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{json_response, now, unauthorized, validate_uuid, verify_password};
use crate::core::query_params::full_path;
use crate::core::store::KvStore;
use crate::forms::decode_form;
use crate::models::models::{TokenData, User};
use crate::repository::Repository;

#[derive(Deserialize, Default)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.header("Authorization")?
        .as_str()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Issues a fresh bearer token for `user_id`.
pub fn issue_token<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now(),
    };
    Repository::new(store).save_token(&token, &data)?;
    Ok(token)
}

/// The user behind the request's bearer token, if the token is known, not
/// expired, and its user still exists.
pub fn current_user<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
) -> anyhow::Result<Option<User>> {
    let token = match bearer_token(req) {
        Some(token) if validate_uuid(token) => token,
        _ => return Ok(None),
    };

    let repo = Repository::new(store);
    let data = match repo.token(token)? {
        Some(data) => data,
        None => return Ok(None),
    };

    let age_hours = (now() - data.created_at).num_hours();
    if age_hours > settings.token_expiration_hours {
        tracing::debug!(user_id = %data.user_id, "expired token rejected");
        repo.delete_token(token)?;
        return Ok(None);
    }

    repo.user_by_id(&data.user_id)
}

/// Capability check at handler entry: an authenticated user or a redirect
/// to the login page that returns here afterwards.
pub fn require_user<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
) -> ApiResult<User> {
    match current_user(store, settings, req)? {
        Some(user) => Ok(user),
        None => Err(ApiError::Unauthorized {
            login_url: settings.login_url.clone(),
            next: full_path(req.path(), req.uri()),
        }),
    }
}

pub fn login_user<S: KvStore>(store: &S, req: &Request) -> ApiResult<Response> {
    if !matches!(req.method(), Method::Post) {
        return Err(ApiError::MethodNotAllowed);
    }

    let creds: Credentials = decode_form(req.body());
    let repo = Repository::new(store);

    let user = match repo.user_by_username(creds.username.trim())? {
        Some(user) if verify_password(&creds.password, &user.password) => user,
        _ => {
            tracing::debug!(username = %creds.username, "login rejected");
            return Ok(unauthorized());
        }
    };

    let token = issue_token(store, &user.id)?;
    tracing::info!(user_id = %user.id, "user logged in");

    let resp = serde_json::json!({
        "token": token,
        "user_id": user.id
    });
    Ok(json_response(http::StatusCode::OK, &resp)?)
}

pub fn logout_user<S: KvStore>(store: &S, req: &Request) -> ApiResult<Response> {
    if !matches!(req.method(), Method::Post) {
        return Err(ApiError::MethodNotAllowed);
    }

    let token = match bearer_token(req) {
        Some(token) => token,
        None => return Ok(unauthorized()),
    };
    Repository::new(store).delete_token(token)?;

    let resp = serde_json::json!({
        "message": "Logged out successfully"
    });
    Ok(json_response(http::StatusCode::OK, &resp)?)
}
