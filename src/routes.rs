use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    NewPost,
    FollowIndex,
    Group { slug: String },
    Profile { username: String },
    PostView { username: String, post_id: u64 },
    PostEdit { username: String, post_id: u64 },
    AddComment { username: String, post_id: u64 },
    ProfileFollow { username: String },
    ProfileUnfollow { username: String },
    Signup,
    Login,
    Logout,
    Media { file: String },
    Static { file: String },
}

fn slug_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Regex should compile"))
}

fn int_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[0-9]+$").expect("Regex should compile"))
}

fn post_id(segment: &str) -> Option<u64> {
    if int_regex().is_match(segment) {
        segment.parse().ok()
    } else {
        None
    }
}

fn username(segment: &str) -> Option<String> {
    let decoded = urlencoding::decode(segment).ok()?.into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

impl Route {
    /// Maps a request path (no query string) to a route. Reserved first
    /// segments (`new`, `follow`, `group`, `auth`, `media`, `static`) shadow
    /// usernames.
    pub fn resolve(path: &str) -> Option<Route> {
        if path == "/" {
            return Some(Route::Index);
        }
        if let Some(file) = path.strip_prefix("/static/") {
            return (!file.is_empty()).then(|| Route::Static { file: file.to_string() });
        }
        if let Some(file) = path.strip_prefix("/media/") {
            return (!file.is_empty()).then(|| Route::Media { file: file.to_string() });
        }

        let slashed = path.ends_with('/');
        let trimmed = path.strip_prefix('/')?.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        // the comment endpoint is the one route without a trailing slash
        if !slashed {
            return match segments.as_slice() {
                [user, id, "comment"] => Some(Route::AddComment {
                    username: username(user)?,
                    post_id: post_id(id)?,
                }),
                _ => None,
            };
        }

        match segments.as_slice() {
            ["new"] => Some(Route::NewPost),
            ["follow"] => Some(Route::FollowIndex),
            ["auth", "signup"] => Some(Route::Signup),
            ["auth", "login"] => Some(Route::Login),
            ["auth", "logout"] => Some(Route::Logout),
            ["group", slug] if slug_regex().is_match(slug) => Some(Route::Group {
                slug: slug.to_string(),
            }),
            [user] => Some(Route::Profile {
                username: username(user)?,
            }),
            [user, "follow"] => Some(Route::ProfileFollow {
                username: username(user)?,
            }),
            [user, "unfollow"] => Some(Route::ProfileUnfollow {
                username: username(user)?,
            }),
            [user, id] => Some(Route::PostView {
                username: username(user)?,
                post_id: post_id(id)?,
            }),
            [user, id, "edit"] => Some(Route::PostEdit {
                username: username(user)?,
                post_id: post_id(id)?,
            }),
            _ => None,
        }
    }

    /// For a path missing its trailing slash, the slashed path when that one
    /// resolves.
    pub fn append_slash(path: &str) -> Option<String> {
        if path.ends_with('/') {
            return None;
        }
        let candidate = format!("{}/", path);
        Route::resolve(&candidate).map(|_| candidate)
    }
}
