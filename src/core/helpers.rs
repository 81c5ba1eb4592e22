use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use http::StatusCode;
use rand::rngs::OsRng;
use serde::Serialize;
use spin_sdk::http::Response;
use uuid::Uuid;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> anyhow::Result<Response> {
    Ok(Response::builder()
        .status(status.as_u16())
        .header("Content-Type", JSON_CONTENT_TYPE)
        .body(serde_json::to_vec(value)?)
        .build())
}

pub fn redirect(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND.as_u16())
        .header("Location", location)
        .body(Vec::new())
        .build()
}

pub fn permanent_redirect(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY.as_u16())
        .header("Location", location)
        .body(Vec::new())
        .build()
}

pub fn unauthorized() -> Response {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED.as_u16())
        .header("Content-Type", JSON_CONTENT_TYPE)
        .body(br#"{"error":"Unauthorized"}"#.to_vec())
        .build()
}

/// `{login_url}?next={path}` with the path percent-encoded except for `/`.
pub fn login_redirect_url(login_url: &str, next: &str) -> String {
    let encoded = urlencoding::encode(next).replace("%2F", "/");
    format!("{}?next={}", login_url, encoded)
}

pub fn post_url(username: &str, post_id: u64) -> String {
    format!("/{}/{}/", urlencoding::encode(username), post_id)
}

pub fn profile_url(username: &str) -> String {
    format!("/{}/", urlencoding::encode(username))
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("other", &hash));
        assert!(!verify_password("s3cret", "not-a-hash"));
    }

    #[test]
    fn login_redirect_keeps_slashes() {
        assert_eq!(
            login_redirect_url("/auth/login/", "/new/"),
            "/auth/login/?next=/new/"
        );
        assert_eq!(
            login_redirect_url("/auth/login/", "/follow/?page=2"),
            "/auth/login/?next=/follow/%3Fpage%3D2"
        );
    }
}
