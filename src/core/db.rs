use chrono::{Duration, Utc};

use crate::core::helpers::hash_password;
use crate::core::store::KvStore;
use crate::models::models::Group;
use crate::repository::Repository;

const DEMO_GROUPS: [(&str, &str, &str); 2] = [
    ("fishing", "Sea fishing", "Boats, bait and the ones that got away"),
    ("cats", "Cats", "Photos and stories about cats"),
];

const DEMO_USERS: [(&str, &str); 3] = [
    ("test", "Hello from the test account!"),
    ("alice", "Welcome to my board! Excited to share thoughts here."),
    ("bob", "Hey everyone! Just joined, looking forward to connecting with you all."),
];

/// Seeds demo groups, users (password = username) with one post each, and
/// `test` following `bob`. Safe to call repeatedly.
pub fn init_test_data<S: KvStore>(store: &S) -> anyhow::Result<()> {
    let repo = Repository::new(store);

    for (slug, title, description) in DEMO_GROUPS {
        if repo.group(slug)?.is_none() {
            repo.save_group(&Group {
                slug: slug.to_string(),
                title: title.to_string(),
                description: description.to_string(),
            })?;
        }
    }

    let start = Utc::now();
    for (offset, (username, text)) in DEMO_USERS.into_iter().enumerate() {
        if repo.user_by_username(username)?.is_some() {
            continue;
        }
        let created_at = start + Duration::seconds(offset as i64);
        let user = repo.create_user(
            username,
            &format!("{}@example.com", username),
            hash_password(username)?,
            created_at,
        )?;
        let group = (username == "alice").then(|| "cats".to_string());
        repo.create_post(&user.id, group, text, created_at)?;
        tracing::info!(%username, "seeded demo user");
    }

    if let (Some(test), Some(bob)) = (repo.user_by_username("test")?, repo.user_by_username("bob")?) {
        repo.follow(&test.id, &bob.id)?;
    }

    Ok(())
}
