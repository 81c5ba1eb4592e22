use http::StatusCode;
use serde::Serialize;
use spin_sdk::http::{Method, Request, Response};

use crate::auth::require_user;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{json_response, now, post_url, redirect, JSON_CONTENT_TYPE};
use crate::core::page_cache::{cache_key, CachedPage, PageCache};
use crate::core::paginator::{paginate, Page};
use crate::core::query_params::{page_param, parse_query_params};
use crate::core::store::KvStore;
use crate::forms::{decode_form, validate_post, FormState, ImageChange, PostFormData};
use crate::models::models::{CommentView, Group, Post, PostView, PublicUser, User};
use crate::repository::{PostScope, Repository};

#[derive(Serialize)]
struct FeedPage {
    page: Page<PostView>,
}

#[derive(Serialize)]
struct GroupPage {
    group: Group,
    page: Page<PostView>,
}

#[derive(Serialize)]
struct PostPage {
    author: PublicUser,
    post: PostView,
    author_posts_count: usize,
    comments: Vec<CommentView>,
}

#[derive(Serialize)]
struct PostFormPage {
    form: FormState,
    groups: Vec<Group>,
    post_edit: bool,
    post: Option<PostView>,
}

/// One page of `scope`, newest first, in display form.
pub fn feed_page<S: KvStore>(
    repo: &Repository<'_, S>,
    scope: PostScope<'_>,
    per_page: usize,
    raw_page: Option<&str>,
) -> anyhow::Result<Page<PostView>> {
    let posts = repo.find_posts(scope)?;
    paginate(posts, per_page, raw_page).try_map_objects(|posts| repo.post_views(posts))
}

fn cached_response(page: &CachedPage, ttl_seconds: i64) -> Response {
    let cache_control = format!("max-age={}", ttl_seconds);
    Response::builder()
        .status(page.status)
        .header("Content-Type", page.content_type.as_str())
        .header("Cache-Control", cache_control.as_str())
        .body(page.body.clone().into_bytes())
        .build()
}

pub fn index<S: KvStore>(store: &S, settings: &Settings, req: &Request) -> ApiResult<Response> {
    let params = parse_query_params(req.uri());
    let cache = PageCache::new(store, settings.index_cache_seconds, PAGE_CACHE_MAX_ENTRIES);
    let key = cache_key(req.path(), &params, &["page"]);
    let now = now();

    if let Some(cached) = cache.get(&key, now)? {
        tracing::debug!(%key, "page cache hit");
        return Ok(cached_response(&cached, cache.ttl_seconds()));
    }

    let repo = Repository::new(store);
    let page = feed_page(&repo, PostScope::All, POSTS_PER_PAGE, page_param(&params))?;
    let page = CachedPage {
        status: StatusCode::OK.as_u16(),
        content_type: JSON_CONTENT_TYPE.to_string(),
        body: serde_json::to_string(&FeedPage { page }).map_err(anyhow::Error::from)?,
        expires_at: now,
    };
    cache.put(&key, page.status, &page.content_type, page.body.clone(), now)?;

    Ok(cached_response(&page, cache.ttl_seconds()))
}

pub fn group_posts<S: KvStore>(store: &S, req: &Request, slug: &str) -> ApiResult<Response> {
    let repo = Repository::new(store);
    let group = repo
        .group(slug)?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;

    let params = parse_query_params(req.uri());
    let page = feed_page(
        &repo,
        PostScope::Group(&group.slug),
        GROUP_POSTS_PER_PAGE,
        page_param(&params),
    )?;

    Ok(json_response(StatusCode::OK, &GroupPage { group, page })?)
}

/// The post `post_id` if it exists and was written by `username`.
fn author_post<S: KvStore>(
    repo: &Repository<'_, S>,
    username: &str,
    post_id: u64,
) -> ApiResult<(User, Post)> {
    let not_found = || ApiError::NotFound("Post not found".to_string());
    let post = repo.post(post_id)?.ok_or_else(not_found)?;
    let author = repo.user_by_id(&post.author_id)?.ok_or_else(not_found)?;
    if author.username != username {
        return Err(not_found());
    }
    Ok((author, post))
}

fn single_view<S: KvStore>(repo: &Repository<'_, S>, post: Post) -> anyhow::Result<PostView> {
    repo.post_views(vec![post])?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("post view missing"))
}

pub fn post_view<S: KvStore>(store: &S, username: &str, post_id: u64) -> ApiResult<Response> {
    let repo = Repository::new(store);
    let (author, post) = author_post(&repo, username, post_id)?;

    let author_posts_count = repo.count_posts(PostScope::Author(&author.id))?;
    let comments = repo.comment_views(repo.comments_for(post.id)?)?;
    let post = single_view(&repo, post)?;

    let body = PostPage {
        author: PublicUser::from(&author),
        post,
        author_posts_count,
        comments,
    };
    Ok(json_response(StatusCode::OK, &body)?)
}

fn render_form<S: KvStore>(
    repo: &Repository<'_, S>,
    form: FormState,
    post: Option<Post>,
) -> ApiResult<Response> {
    let post_edit = post.is_some();
    let post = match post {
        Some(post) => Some(single_view(repo, post)?),
        None => None,
    };
    let body = PostFormPage {
        form,
        groups: repo.groups()?,
        post_edit,
        post,
    };
    Ok(json_response(StatusCode::OK, &body)?)
}

fn apply_image<S: KvStore>(
    repo: &Repository<'_, S>,
    post: &mut Post,
    change: ImageChange,
) -> anyhow::Result<()> {
    match change {
        ImageChange::Keep => {}
        ImageChange::Clear => {
            repo.delete_image(post.id)?;
            post.image = None;
        }
        ImageChange::Replace(image) => {
            repo.save_image(post.id, &image.bytes)?;
            post.image = Some(format!("posts/{}.{}", post.id, image.extension));
        }
    }
    Ok(())
}

pub fn new_post<S: KvStore>(store: &S, settings: &Settings, req: &Request) -> ApiResult<Response> {
    let user = require_user(store, settings, req)?;
    let repo = Repository::new(store);

    match req.method() {
        Method::Get => render_form(&repo, FormState::default(), None),
        Method::Post => {
            let data: PostFormData = decode_form(req.body());
            let clean = match validate_post(&repo, &data)? {
                Ok(clean) => clean,
                Err(errors) => return render_form(&repo, FormState::bound(&data, errors), None),
            };

            let mut post = repo.create_post(&user.id, clean.group, &clean.text, now())?;
            if clean.image != ImageChange::Keep {
                apply_image(&repo, &mut post, clean.image)?;
                repo.save_post(&post)?;
            }
            tracing::info!(post_id = post.id, author = %user.username, "post created");

            Ok(redirect("/"))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

pub fn post_edit<S: KvStore>(
    store: &S,
    settings: &Settings,
    req: &Request,
    username: &str,
    post_id: u64,
) -> ApiResult<Response> {
    let user = require_user(store, settings, req)?;
    let repo = Repository::new(store);
    let (author, mut post) = author_post(&repo, username, post_id)?;
    let target = post_url(&author.username, post.id);

    if author.id != user.id {
        tracing::debug!(post_id, viewer = %user.username, "edit by non-author ignored");
        return Ok(redirect(&target));
    }

    match req.method() {
        Method::Get => {
            let form = FormState {
                text: post.text.clone(),
                group: post.group.clone(),
                ..FormState::default()
            };
            render_form(&repo, form, Some(post))
        }
        Method::Post => {
            let data: PostFormData = decode_form(req.body());
            let clean = match validate_post(&repo, &data)? {
                Ok(clean) => clean,
                Err(errors) => {
                    return render_form(&repo, FormState::bound(&data, errors), Some(post))
                }
            };

            post.text = clean.text;
            post.group = clean.group;
            apply_image(&repo, &mut post, clean.image)?;
            post.updated_at = Some(now());
            repo.save_post(&post)?;
            tracing::info!(post_id, author = %user.username, "post updated");

            Ok(redirect(&target))
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

/// Serves `posts/{id}.{ext}`, the only media the service stores.
pub fn serve_media<S: KvStore>(store: &S, file: &str) -> ApiResult<Response> {
    let not_found = || ApiError::NotFound("File not found".to_string());
    let name = file.strip_prefix("posts/").ok_or_else(not_found)?;
    let (id, ext) = name.split_once('.').ok_or_else(not_found)?;
    let id: u64 = id.parse().map_err(|_| not_found())?;

    let repo = Repository::new(store);
    let post = repo.post(id)?.ok_or_else(not_found)?;
    if post.image.as_deref() != Some(file) {
        return Err(not_found());
    }
    let bytes = repo.image(id)?.ok_or_else(not_found)?;
    let mime = mime_guess::from_ext(ext).first_or_octet_stream();

    Ok(Response::builder()
        .status(StatusCode::OK.as_u16())
        .header("Content-Type", mime.as_ref())
        .body(bytes)
        .build())
}
