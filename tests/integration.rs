use std::io::Cursor;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageBuffer, ImageOutputFormat, Rgb};
use serde_json::{json, Value};

use scribe::auth::issue_token;
use scribe::config::Settings;
use scribe::core::helpers::{hash_password, now};
use scribe::models::models::Group;
use scribe::repository::Repository;
use scribe::server::{handle_all, payload_config, AppState};

struct Reply {
    status: StatusCode,
    location: Option<String>,
    cache_control: Option<String>,
    body: web::Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

fn state_with(index_cache_seconds: i64) -> web::Data<AppState> {
    let settings = Settings {
        index_cache_seconds,
        ..Settings::default()
    };
    let state = AppState::new(settings);
    let repo = Repository::new(&state.store);
    for (slug, title) in [("cats", "Cats"), ("fishing", "Sea fishing")] {
        repo.save_group(&Group {
            slug: slug.to_string(),
            title: title.to_string(),
            description: String::new(),
        })
        .unwrap();
    }
    state
}

fn state() -> web::Data<AppState> {
    state_with(0)
}

async fn send(state: &web::Data<AppState>, req: test::TestRequest) -> Reply {
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .app_data(payload_config(&state.settings))
            .default_service(web::route().to(handle_all)),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;

    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let status = resp.status();
    let location = header("Location");
    let cache_control = header("Cache-Control");
    let body = test::read_body(resp).await;

    Reply {
        status,
        location,
        cache_control,
        body,
    }
}

/// Creates `username` directly in the store and returns a bearer token.
fn login_as(state: &web::Data<AppState>, username: &str) -> String {
    let repo = Repository::new(&state.store);
    let user = repo
        .create_user(
            username,
            &format!("{}@example.com", username),
            hash_password("secret").unwrap(),
            now(),
        )
        .unwrap();
    issue_token(&state.store, &user.id).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> test::TestRequest {
    authorized(test::TestRequest::get().uri(uri), token)
}

fn post(uri: &str, token: Option<&str>, body: Value) -> test::TestRequest {
    authorized(test::TestRequest::post().uri(uri).set_json(body), token)
}

fn authorized(req: test::TestRequest, token: Option<&str>) -> test::TestRequest {
    match token {
        Some(token) => req.insert_header(("Authorization", format!("Bearer {}", token))),
        None => req,
    }
}

fn png_base64() -> String {
    let img = ImageBuffer::from_pixel(60, 30, Rgb([73u8, 109, 137]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .unwrap();
    STANDARD.encode(bytes.into_inner())
}

/// A PNG of random noise; it barely compresses.
fn large_png_base64() -> String {
    let img = ImageBuffer::from_fn(400, 400, |_, _| Rgb(rand::random::<[u8; 3]>()));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .unwrap();
    STANDARD.encode(bytes.into_inner())
}

fn object_list(reply: &Reply) -> Vec<Value> {
    reply.json()["page"]["object_list"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[actix_web::test]
async fn signup_login_and_publish() {
    let state = state();

    let signup = send(
        &state,
        post(
            "/auth/signup/",
            None,
            json!({"username": "leo", "email": "leo@example.com", "password": "secret"}),
        ),
    )
    .await;
    assert_eq!(signup.status, StatusCode::CREATED);
    let user = signup.json();
    assert_eq!(user["username"], "leo");
    assert!(user.get("password").is_none(), "password leaked: {:?}", user);

    let duplicate = send(
        &state,
        post("/auth/signup/", None, json!({"username": "leo", "password": "secret"})),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let bad_login = send(
        &state,
        post("/auth/login/", None, json!({"username": "leo", "password": "nope"})),
    )
    .await;
    assert_eq!(bad_login.status, StatusCode::UNAUTHORIZED);

    let login = send(
        &state,
        post("/auth/login/", None, json!({"username": "leo", "password": "secret"})),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    let token = login.json()["token"].as_str().unwrap().to_string();

    let form = send(&state, get("/new/", Some(&token))).await;
    assert_eq!(form.status, StatusCode::OK);
    let form = form.json();
    assert_eq!(form["post_edit"], false);
    assert_eq!(form["groups"].as_array().unwrap().len(), 2);

    let created = send(
        &state,
        post("/new/", Some(&token), json!({"text": "Hello", "group": "cats"})),
    )
    .await;
    assert_eq!(created.status, StatusCode::FOUND);
    assert_eq!(created.location.as_deref(), Some("/"));

    let index = send(&state, get("/", None)).await;
    let posts = object_list(&index);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["text"], "Hello");
    assert_eq!(posts[0]["author"], "leo");
    assert_eq!(posts[0]["group"]["slug"], "cats");

    let logout = send(&state, post("/auth/logout/", Some(&token), json!({}))).await;
    assert_eq!(logout.status, StatusCode::OK);
    let after = send(&state, get("/new/", Some(&token))).await;
    assert_eq!(after.status, StatusCode::FOUND);
}

#[actix_web::test]
async fn anonymous_writes_redirect_to_login() {
    let state = state();

    let form = send(&state, get("/new/", None)).await;
    assert_eq!(form.status, StatusCode::FOUND);
    assert_eq!(form.location.as_deref(), Some("/auth/login/?next=/new/"));

    let submit = send(&state, post("/new/", None, json!({"text": "sneaky"}))).await;
    assert_eq!(submit.status, StatusCode::FOUND);
    let index = send(&state, get("/", None)).await;
    assert!(object_list(&index).is_empty());

    let feed = send(&state, get("/follow/?page=2", None)).await;
    assert_eq!(
        feed.location.as_deref(),
        Some("/auth/login/?next=/follow/%3Fpage%3D2")
    );
}

#[actix_web::test]
async fn invalid_post_form_is_redisplayed_with_errors() {
    let state = state();
    let token = login_as(&state, "leo");

    let reply = send(
        &state,
        post("/new/", Some(&token), json!({"text": "  ", "group": "dogs"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let form = reply.json()["form"].clone();
    assert_eq!(form["group"], "dogs");
    assert!(form["errors"]["text"].is_array());
    assert!(form["errors"]["group"].is_array());

    let index = send(&state, get("/", None)).await;
    assert!(object_list(&index).is_empty());
}

#[actix_web::test]
async fn unknown_paths_and_missing_slashes() {
    let state = state();
    login_as(&state, "leo");

    assert_eq!(send(&state, get("/nobody/", None)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&state, get("/leo/999/", None)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&state, get("/group/dogs/", None)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&state, get("/a/b/c/d/", None)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        send(&state, get("/media/posts/1.png", None)).await.status,
        StatusCode::NOT_FOUND
    );

    let slashed = send(&state, get("/leo?page=2", None)).await;
    assert_eq!(slashed.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(slashed.location.as_deref(), Some("/leo/?page=2"));

    let profile = send(&state, get("/leo/", None)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json()["author"]["username"], "leo");

    let wrong_method = send(&state, post("/", None, json!({}))).await;
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[actix_web::test]
async fn edit_moves_post_between_groups() {
    let state = state();
    let token = login_as(&state, "leo");
    let author_id = Repository::new(&state.store)
        .user_by_username("leo")
        .unwrap()
        .unwrap()
        .id;
    let created = Repository::new(&state.store)
        .create_post(&author_id, Some("cats".to_string()), "Original", now())
        .unwrap();
    let edit_url = format!("/leo/{}/edit/", created.id);

    let form = send(&state, get(&edit_url, Some(&token))).await;
    assert_eq!(form.status, StatusCode::OK);
    let form = form.json();
    assert_eq!(form["post_edit"], true);
    assert_eq!(form["form"]["text"], "Original");
    assert_eq!(form["form"]["group"], "cats");

    let saved = send(
        &state,
        post(&edit_url, Some(&token), json!({"text": "Edited", "group": "fishing"})),
    )
    .await;
    assert_eq!(saved.status, StatusCode::FOUND);
    assert_eq!(saved.location, Some(format!("/leo/{}/", created.id)));

    let cats = send(&state, get("/group/cats/", None)).await;
    assert!(object_list(&cats).is_empty());
    let fishing = send(&state, get("/group/fishing/", None)).await;
    let posts = object_list(&fishing);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["text"], "Edited");

    let view = send(&state, get(&format!("/leo/{}/", created.id), None)).await.json();
    assert_eq!(view["post"]["text"], "Edited");
    assert!(view["post"]["updated_at"].is_string());
    assert_eq!(view["author_posts_count"], 1);
    assert_eq!(view["author"]["username"], "leo");
    assert!(view["author"].get("email").is_none());
}

#[actix_web::test]
async fn non_author_edit_changes_nothing() {
    let state = state();
    login_as(&state, "leo");
    let intruder = login_as(&state, "mallory");
    let author_id = Repository::new(&state.store)
        .user_by_username("leo")
        .unwrap()
        .unwrap()
        .id;
    let created = Repository::new(&state.store)
        .create_post(&author_id, None, "Mine", now())
        .unwrap();

    let reply = send(
        &state,
        post(
            &format!("/leo/{}/edit/", created.id),
            Some(&intruder),
            json!({"text": "Yours now"}),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location, Some(format!("/leo/{}/", created.id)));

    let post = Repository::new(&state.store).post(created.id).unwrap().unwrap();
    assert_eq!(post.text, "Mine");
    assert!(post.updated_at.is_none());
}

#[actix_web::test]
async fn follow_is_idempotent_and_feeds_followed_authors() {
    let state = state();
    let reader = login_as(&state, "reader");
    let leo = login_as(&state, "leo");
    login_as(&state, "quiet");

    send(&state, post("/new/", Some(&leo), json!({"text": "From leo"}))).await;

    for _ in 0..2 {
        let reply = send(&state, post("/leo/follow/", Some(&reader), json!({}))).await;
        assert_eq!(reply.status, StatusCode::FOUND);
        assert_eq!(reply.location.as_deref(), Some("/leo/"));
    }
    send(&state, get("/reader/follow/", Some(&reader))).await;

    let profile = send(&state, get("/leo/", Some(&reader))).await.json();
    assert_eq!(profile["following"], true);
    assert_eq!(profile["follower_count"], 1);
    let own = send(&state, get("/reader/", Some(&reader))).await.json();
    assert_eq!(own["following_count"], 1);

    let feed = send(&state, get("/follow/", Some(&reader))).await;
    let posts = object_list(&feed);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["author"], "leo");

    for _ in 0..2 {
        let reply = send(&state, get("/leo/unfollow/", Some(&reader))).await;
        assert_eq!(reply.location.as_deref(), Some("/leo/"));
    }
    let profile = send(&state, get("/leo/", Some(&reader))).await.json();
    assert_eq!(profile["following"], false);
    assert_eq!(profile["follower_count"], 0);
    assert!(object_list(&send(&state, get("/follow/", Some(&reader))).await).is_empty());

    let missing = send(&state, get("/ghost/follow/", Some(&reader))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn comments_need_a_logged_in_author() {
    let state = state();
    let leo = login_as(&state, "leo");
    let guest = login_as(&state, "guest");
    send(&state, post("/new/", Some(&leo), json!({"text": "Discuss"}))).await;
    let post_id = Repository::new(&state.store).find_posts(scribe::repository::PostScope::All)
        .unwrap()[0]
        .id;
    let comment_url = format!("/leo/{}/comment", post_id);
    let post_url = format!("/leo/{}/", post_id);

    let anonymous = send(&state, post(&comment_url, None, json!({"text": "hi"}))).await;
    assert_eq!(anonymous.status, StatusCode::FOUND);
    assert_eq!(
        anonymous.location,
        Some(format!("/auth/login/?next=/leo/{}/comment", post_id))
    );

    let empty = send(&state, post(&comment_url, Some(&guest), json!({"text": "   "}))).await;
    assert_eq!(empty.location.as_deref(), Some(post_url.as_str()));

    let added = send(&state, post(&comment_url, Some(&guest), json!({"text": "Nice one"}))).await;
    assert_eq!(added.status, StatusCode::FOUND);
    assert_eq!(added.location.as_deref(), Some(post_url.as_str()));

    let view = send(&state, get(&post_url, None)).await.json();
    let comments = view["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author"], "guest");
    assert_eq!(comments[0]["text"], "Nice one");

    let missing = send(&state, post("/leo/999/comment", Some(&guest), json!({"text": "x"}))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn index_is_cached_for_its_window() {
    let state = state_with(1);
    let token = login_as(&state, "leo");

    let first = send(&state, get("/", None)).await;
    assert_eq!(first.cache_control.as_deref(), Some("max-age=1"));
    assert!(object_list(&first).is_empty());

    send(&state, post("/new/", Some(&token), json!({"text": "Fresh"}))).await;

    let cached = send(&state, get("/", None)).await;
    assert_eq!(cached.body, first.body);

    // unrelated parameters share the entry; `page` gets its own
    let junk = send(&state, get("/?utm_source=feed", None)).await;
    assert_eq!(junk.body, first.body);
    let other = send(&state, get("/?page=1", None)).await;
    assert_eq!(object_list(&other).len(), 1);

    std::thread::sleep(Duration::from_millis(1100));
    let expired = send(&state, get("/", None)).await;
    assert_eq!(object_list(&expired).len(), 1);
}

#[actix_web::test]
async fn feeds_paginate_like_get_page() {
    let state = state();
    let token = login_as(&state, "leo");
    for n in 0..13 {
        let reply = send(
            &state,
            post("/new/", Some(&token), json!({"text": format!("post {}", n), "group": "cats"})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::FOUND);
    }

    let first = send(&state, get("/", None)).await.json();
    assert_eq!(first["page"]["object_list"].as_array().unwrap().len(), 10);
    assert_eq!(first["page"]["object_list"][0]["text"], "post 12");
    assert_eq!(first["page"]["num_pages"], 2);

    let second = send(&state, get("/?page=2", None)).await.json();
    assert_eq!(second["page"]["object_list"].as_array().unwrap().len(), 3);

    let junk = send(&state, get("/?page=abc", None)).await.json();
    assert_eq!(junk["page"]["number"], 1);
    let beyond = send(&state, get("/leo/?page=99", None)).await.json();
    assert_eq!(beyond["page"]["number"], 2);

    let group = send(&state, get("/group/cats/?page=5", None)).await.json();
    assert_eq!(group["page"]["number"], 5);
    assert_eq!(group["page"]["object_list"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn images_are_validated_and_served() {
    let state = state();
    let token = login_as(&state, "leo");
    send(&state, post("/new/", Some(&token), json!({"text": "Pictureless"}))).await;
    let post_id = Repository::new(&state.store).find_posts(scribe::repository::PostScope::All)
        .unwrap()[0]
        .id;
    let edit_url = format!("/leo/{}/edit/", post_id);

    let rejected = send(
        &state,
        post(
            &edit_url,
            Some(&token),
            json!({"text": "Broken", "image": STANDARD.encode(b"not an image")}),
        ),
    )
    .await;
    assert_eq!(rejected.status, StatusCode::OK);
    assert!(rejected.json()["form"]["errors"]["image"].is_array());
    let unchanged = Repository::new(&state.store).post(post_id).unwrap().unwrap();
    assert_eq!(unchanged.text, "Pictureless");
    assert!(unchanged.image.is_none());

    let accepted = send(
        &state,
        post(&edit_url, Some(&token), json!({"text": "With picture", "image": png_base64()})),
    )
    .await;
    assert_eq!(accepted.status, StatusCode::FOUND);

    let view = send(&state, get(&format!("/leo/{}/", post_id), None)).await.json();
    let image_url = view["post"]["image"].as_str().unwrap().to_string();
    assert_eq!(image_url, format!("/media/posts/{}.png", post_id));

    let media = send(&state, get(&image_url, None)).await;
    assert_eq!(media.status, StatusCode::OK);
    assert!(image::load_from_memory(&media.body).is_ok());

    let cleared = send(
        &state,
        post(&edit_url, Some(&token), json!({"text": "Plain again", "image_clear": true})),
    )
    .await;
    assert_eq!(cleared.status, StatusCode::FOUND);
    assert_eq!(send(&state, get(&image_url, None)).await.status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn static_files_are_embedded() {
    let state = state();
    let robots = send(&state, get("/static/robots.txt", None)).await;
    assert_eq!(robots.status, StatusCode::OK);
    assert_eq!(
        send(&state, get("/static/../Cargo.toml", None)).await.status,
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn large_images_fit_within_the_body_limit() {
    let state = state();
    let token = login_as(&state, "leo");
    send(&state, post("/new/", Some(&token), json!({"text": "Panorama"}))).await;
    let post_id = Repository::new(&state.store).find_posts(scribe::repository::PostScope::All)
        .unwrap()[0]
        .id;

    let image = large_png_base64();
    assert!(image.len() > 256 * 1024);

    let saved = send(
        &state,
        post(
            &format!("/leo/{}/edit/", post_id),
            Some(&token),
            json!({"text": "Panorama", "image": image}),
        ),
    )
    .await;
    assert_eq!(saved.status, StatusCode::FOUND);
    let stored = Repository::new(&state.store).post(post_id).unwrap().unwrap();
    assert_eq!(stored.image, Some(format!("posts/{}.png", post_id)));
}

#[actix_web::test]
async fn bodies_over_the_limit_are_refused() {
    let state = AppState::new(Settings {
        max_body_bytes: 1024,
        ..Settings::default()
    });
    let token = login_as(&state, "leo");

    let reply = send(
        &state,
        post("/new/", Some(&token), json!({"text": "x".repeat(4096)})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(Repository::new(&state.store).find_posts(scribe::repository::PostScope::All)
        .unwrap()
        .is_empty());
}
