use spin_sdk::http::{Method, Request, Response};

use crate::config::Settings;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::permanent_redirect;
use crate::core::query_params::full_path;
use crate::core::static_server::serve_static;
use crate::core::store::KvStore;
use crate::routes::Route;
use crate::{auth, comments, follow, posts, users};

/// Resolves and runs the handler for `req`. Never fails: errors become
/// their HTTP responses here.
pub fn handle_request<S: KvStore>(store: &S, settings: &Settings, req: &Request) -> Response {
    let path = req.path().to_string();
    let is_get = matches!(req.method(), Method::Get | Method::Head);

    let result = match Route::resolve(&path) {
        Some(route) => dispatch(store, settings, req, route),
        None => match Route::append_slash(&path) {
            Some(slashed) if is_get => {
                Ok(permanent_redirect(&full_path(&slashed, req.uri())))
            }
            _ => Err(ApiError::NotFound("Page not found".to_string())),
        },
    };
    let result = result.map_err(|err| err.at_path(&path));

    let response = result.unwrap_or_else(Response::from);
    tracing::debug!(%path, status = *response.status(), "handled");
    response
}

fn read_only(req: &Request) -> ApiResult<()> {
    match req.method() {
        Method::Get | Method::Head => Ok(()),
        _ => Err(ApiError::MethodNotAllowed),
    }
}

fn dispatch<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
    route: Route,
) -> ApiResult<Response> {
    match route {
        Route::Index => {
            read_only(req)?;
            posts::index(store, settings, req)
        }
        Route::NewPost => posts::new_post(store, settings, req),
        Route::FollowIndex => {
            read_only(req)?;
            follow::follow_index(store, settings, req)
        }
        Route::Group { slug } => {
            read_only(req)?;
            posts::group_posts(store, req, &slug)
        }
        Route::Profile { username } => {
            read_only(req)?;
            users::profile(store, settings, req, &username)
        }
        Route::PostView { username, post_id } => {
            read_only(req)?;
            posts::post_view(store, &username, post_id)
        }
        Route::PostEdit { username, post_id } => {
            posts::post_edit(store, settings, req, &username, post_id)
        }
        Route::AddComment { username, post_id } => {
            comments::add_comment(store, settings, req, &username, post_id)
        }
        Route::ProfileFollow { username } => {
            follow::handle_follow(store, settings, req, &username)
        }
        Route::ProfileUnfollow { username } => {
            follow::handle_unfollow(store, settings, req, &username)
        }
        Route::Signup => users::create_user(store, req),
        Route::Login => auth::login_user(store, req),
        Route::Logout => auth::logout_user(store, req),
        Route::Media { file } => {
            read_only(req)?;
            posts::serve_media(store, &file)
        }
        Route::Static { file } => {
            read_only(req)?;
            serve_static(&file)
        }
    }
}
