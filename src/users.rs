use std::sync::OnceLock;

use http::StatusCode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use spin_sdk::http::{Method, Request, Response};

use crate::auth::current_user;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{hash_password, json_response, now};
use crate::core::paginator::Page;
use crate::core::query_params::{page_param, parse_query_params};
use crate::core::store::KvStore;
use crate::forms::decode_form;
use crate::models::models::{PostView, PublicUser};
use crate::posts::feed_page;
use crate::repository::{PostScope, Repository};

#[derive(Deserialize, Default)]
struct SignupForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct ProfilePage {
    author: PublicUser,
    page: Page<PostView>,
    following: bool,
    following_count: usize,
    follower_count: usize,
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Regex should compile"))
}

pub fn create_user<S: KvStore>(store: &S, req: &Request) -> ApiResult<Response> {
    if !matches!(req.method(), Method::Post) {
        return Err(ApiError::MethodNotAllowed);
    }

    let form: SignupForm = decode_form(req.body());
    let username = form.username.trim();
    let email = form.email.trim();

    if username.is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(ApiError::BadRequest(
            "Username must be 3-50 characters".to_string(),
        ));
    }
    if !username_regex().is_match(username) {
        return Err(ApiError::BadRequest(
            "Username may contain only letters, digits and @/./+/-/_".to_string(),
        ));
    }
    if form.password.is_empty() {
        return Err(ApiError::BadRequest("Password is required".to_string()));
    }
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(
            "Password must be at least 3 characters".to_string(),
        ));
    }
    if email.len() > MAX_EMAIL_LENGTH || (!email.is_empty() && !email.contains('@')) {
        return Err(ApiError::BadRequest("Enter a valid email address".to_string()));
    }

    let repo = Repository::new(store);
    if repo.user_by_username(username)?.is_some() {
        return Err(ApiError::Conflict("Username exists".to_string()));
    }

    let user = repo.create_user(username, email, hash_password(&form.password)?, now())?;
    tracing::info!(user_id = %user.id, username = %user.username, "user created");

    Ok(json_response(StatusCode::CREATED, &user)?)
}

pub fn profile<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
    username: &str,
) -> ApiResult<Response> {
    let repo = Repository::new(store);
    let author = repo
        .user_by_username(username)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let params = parse_query_params(req.uri());
    let page = feed_page(
        &repo,
        PostScope::Author(&author.id),
        POSTS_PER_PAGE,
        page_param(&params),
    )?;

    let following = match current_user(store, settings, req)? {
        Some(viewer) => repo.is_following(&viewer.id, &author.id)?,
        None => false,
    };

    let body = ProfilePage {
        author: PublicUser::from(&author),
        page,
        following,
        following_count: repo.followings(&author.id)?.len(),
        follower_count: repo.followers(&author.id)?.len(),
    };
    Ok(json_response(StatusCode::OK, &body)?)
}
