use http::StatusCode;
use serde::Serialize;
use spin_sdk::http::{Request, Response};

use crate::auth::require_user;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{json_response, profile_url, redirect};
use crate::core::paginator::Page;
use crate::core::query_params::{page_param, parse_query_params};
use crate::core::store::KvStore;
use crate::models::models::{PostView, User};
use crate::posts::feed_page;
use crate::repository::{PostScope, Repository};

#[derive(Serialize)]
struct FollowFeed {
    page: Page<PostView>,
}

fn target_user<S: KvStore>(repo: &Repository<'_, S>, username: &str) -> ApiResult<User> {
    repo.user_by_username(username)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

// === HTTP Handlers ===

/// Posts by every author the viewer follows.
pub fn follow_index<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
) -> ApiResult<Response> {
    let user = require_user(store, settings, req)?;
    let repo = Repository::new(store);

    let params = parse_query_params(req.uri());
    let page = feed_page(
        &repo,
        PostScope::FollowedBy(&user.id),
        POSTS_PER_PAGE,
        page_param(&params),
    )?;

    Ok(json_response(StatusCode::OK, &FollowFeed { page })?)
}

pub fn handle_follow<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
    username: &str,
) -> ApiResult<Response> {
    let user = require_user(store, settings, req)?;
    let repo = Repository::new(store);
    let author = target_user(&repo, username)?;

    match repo.follow(&user.id, &author.id)? {
        Some(_) => tracing::info!(follower = %user.username, author = %author.username, "followed"),
        None => tracing::debug!(follower = %user.username, author = %author.username, "follow was a no-op"),
    }

    Ok(redirect(&profile_url(&author.username)))
}

pub fn handle_unfollow<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
    username: &str,
) -> ApiResult<Response> {
    let user = require_user(store, settings, req)?;
    let repo = Repository::new(store);
    let author = target_user(&repo, username)?;

    if repo.unfollow(&user.id, &author.id)? {
        tracing::info!(follower = %user.username, author = %author.username, "unfollowed");
    }

    Ok(redirect(&profile_url(&author.username)))
}
