use std::env;

// === Limits ===
pub const POSTS_PER_PAGE: usize = 10;
pub const GROUP_POSTS_PER_PAGE: usize = 3;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const PAGE_CACHE_MAX_ENTRIES: usize = 100;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// === Store keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const GROUPS_LIST_KEY: &str = "groups_list";
pub const FEED_KEY: &str = "feed";
pub const POST_SEQ_KEY: &str = "seq:post";
pub const COMMENT_SEQ_KEY: &str = "seq:comment";
pub const PAGE_CACHE_INDEX_KEY: &str = "page_cache_index";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn group_key(slug: &str) -> String {
    format!("group:{}", slug)
}

pub fn post_key(id: u64) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: u64) -> String {
    format!("comment:{}", id)
}

pub fn post_comments_key(post_id: u64) -> String {
    format!("comments:{}", post_id)
}

pub fn followings_key(user_id: &str) -> String {
    format!("followings:{}", user_id)
}

pub fn followers_key(user_id: &str) -> String {
    format!("followers:{}", user_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn media_key(post_id: u64) -> String {
    format!("media:{}", post_id)
}

pub fn page_cache_key(key: &str) -> String {
    format!("page_cache:{}", key)
}

/// Runtime settings, read from `SCRIBE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub token_expiration_hours: i64,
    pub index_cache_seconds: i64,
    pub login_url: String,
    pub seed_demo_data: bool,
    /// Largest request body the native server accepts.
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            token_expiration_hours: 24,
            index_cache_seconds: 20,
            login_url: "/auth/login/".to_string(),
            seed_demo_data: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env::var("SCRIBE_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            token_expiration_hours: parse_env("SCRIBE_TOKEN_EXPIRATION_HOURS")
                .unwrap_or(defaults.token_expiration_hours),
            index_cache_seconds: parse_env("SCRIBE_INDEX_CACHE_SECONDS")
                .unwrap_or(defaults.index_cache_seconds)
                .max(0),
            login_url: env::var("SCRIBE_LOGIN_URL").unwrap_or(defaults.login_url),
            seed_demo_data: parse_env("SCRIBE_SEED_DEMO_DATA").unwrap_or(defaults.seed_demo_data),
            max_body_bytes: parse_env("SCRIBE_MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}
