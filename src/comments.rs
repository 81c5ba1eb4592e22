use spin_sdk::http::{Method, Request, Response};

use crate::auth::require_user;
use crate::config::Settings;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{now, post_url, redirect};
use crate::core::store::KvStore;
use crate::forms::{decode_form, validate_comment, CommentFormData};
use crate::repository::Repository;

/// Attaches a comment to the post named in the URL. Author and post come
/// from the session and the path; the body only contributes `text`.
pub fn add_comment<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
    username: &str,
    post_id: u64,
) -> ApiResult<Response> {
    let user = require_user(store, settings, req)?;
    let repo = Repository::new(store);
    let post = repo
        .post(post_id)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    if matches!(req.method(), Method::Post) {
        let data: CommentFormData = decode_form(req.body());
        match validate_comment(&data) {
            Ok(text) => {
                let comment = repo.add_comment(post.id, &user.id, &text, now())?;
                tracing::info!(comment_id = comment.id, post_id, author = %user.username, "comment added");
            }
            Err(_) => tracing::debug!(post_id, "empty comment dropped"),
        }
    }

    Ok(redirect(&post_url(username, post_id)))
}
