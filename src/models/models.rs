use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Group {
    pub slug: String,
    pub title: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: u64,
    pub author_id: String,
    pub group: Option<String>,
    pub text: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Directed edge: `user_id` receives `author_id`'s posts in the follow feed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Follow {
    pub user_id: String,
    pub author_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

// === Response shapes ===

/// What anyone may see of a user.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PublicUser {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct GroupRef {
    pub slug: String,
    pub title: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct PostView {
    pub id: u64,
    pub text: String,
    pub author: String,
    pub group: Option<GroupRef>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Clone, Debug)]
pub struct CommentView {
    pub id: u64,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

pub type Followings = Vec<String>;
pub type Followers = Vec<String>;
