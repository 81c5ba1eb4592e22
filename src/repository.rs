//! Record access over a [`KvStore`].
//!
//! Every list query is expressed as a [`PostScope`] predicate evaluated
//! against the global feed, so the storage backend only has to provide
//! plain key lookups.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::*;
use crate::core::store::KvStore;
use crate::models::models::{
    Comment, CommentView, Follow, Followers, Followings, Group, GroupRef, Post, PostView,
    TokenData, User,
};

/// Which posts a feed shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope<'a> {
    All,
    Author(&'a str),
    Group(&'a str),
    /// Posts whose author is followed by the given user.
    FollowedBy(&'a str),
}

enum ScopeFilter<'a> {
    All,
    Author(&'a str),
    Group(&'a str),
    Authors(HashSet<String>),
}

impl ScopeFilter<'_> {
    fn matches(&self, post: &Post) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Author(id) => post.author_id == *id,
            ScopeFilter::Group(slug) => post.group.as_deref() == Some(*slug),
            ScopeFilter::Authors(ids) => ids.contains(&post.author_id),
        }
    }
}

pub struct Repository<'a, S: KvStore> {
    store: &'a S,
}

impl<'a, S: KvStore> Repository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn next_id(&self, seq_key: &str) -> anyhow::Result<u64> {
        self.store
            .update_json(seq_key, |current: Option<u64>| current.unwrap_or(0) + 1)
    }

    // === Users ===

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> anyhow::Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password: password_hash,
            created_at: now,
        };

        if !self
            .store
            .insert_new_json(&username_key(&user.username), &user.id)?
        {
            anyhow::bail!("username {} is taken", user.username);
        }
        self.store.set_json(&user_key(&user.id), &user)?;
        self.store
            .update_json(USERS_LIST_KEY, |users: Option<Vec<String>>| {
                let mut users = users.unwrap_or_default();
                users.push(user.id.clone());
                users
            })?;

        Ok(user)
    }

    pub fn user_by_id(&self, id: &str) -> anyhow::Result<Option<User>> {
        self.store.get_json(&user_key(id))
    }

    pub fn user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        match self.store.get_json::<String>(&username_key(username))? {
            Some(id) => self.user_by_id(&id),
            None => Ok(None),
        }
    }

    // === Groups ===

    /// Creates the group, or overwrites title and description when the slug
    /// already exists.
    pub fn save_group(&self, group: &Group) -> anyhow::Result<()> {
        self.store
            .update_json(GROUPS_LIST_KEY, |slugs: Option<Vec<String>>| {
                let mut slugs = slugs.unwrap_or_default();
                if !slugs.contains(&group.slug) {
                    slugs.push(group.slug.clone());
                }
                slugs
            })?;
        self.store.set_json(&group_key(&group.slug), group)
    }

    pub fn group(&self, slug: &str) -> anyhow::Result<Option<Group>> {
        self.store.get_json(&group_key(slug))
    }

    pub fn groups(&self) -> anyhow::Result<Vec<Group>> {
        let slugs: Vec<String> = self.store.get_json(GROUPS_LIST_KEY)?.unwrap_or_default();
        let mut groups = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if let Some(group) = self.group(&slug)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    // === Posts ===

    pub fn create_post(
        &self,
        author_id: &str,
        group: Option<String>,
        text: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Post> {
        let post = Post {
            id: self.next_id(POST_SEQ_KEY)?,
            author_id: author_id.to_string(),
            group,
            text: text.to_string(),
            image: None,
            created_at: now,
            updated_at: None,
        };
        if !self.store.insert_new_json(&post_key(post.id), &post)? {
            anyhow::bail!("post {} already exists", post.id);
        }

        // newest first
        self.store.update_json(FEED_KEY, |feed: Option<Vec<u64>>| {
            let mut feed = feed.unwrap_or_default();
            feed.insert(0, post.id);
            feed
        })?;

        Ok(post)
    }

    pub fn post(&self, id: u64) -> anyhow::Result<Option<Post>> {
        self.store.get_json(&post_key(id))
    }

    pub fn save_post(&self, post: &Post) -> anyhow::Result<()> {
        self.store.set_json(&post_key(post.id), post)
    }

    /// Posts in `scope`, newest first.
    pub fn find_posts(&self, scope: PostScope<'_>) -> anyhow::Result<Vec<Post>> {
        let filter = match scope {
            PostScope::All => ScopeFilter::All,
            PostScope::Author(id) => ScopeFilter::Author(id),
            PostScope::Group(slug) => ScopeFilter::Group(slug),
            PostScope::FollowedBy(user_id) => {
                let authors = self.followings(user_id)?;
                if authors.is_empty() {
                    return Ok(Vec::new());
                }
                ScopeFilter::Authors(authors.into_iter().collect())
            }
        };

        let feed: Vec<u64> = self.store.get_json(FEED_KEY)?.unwrap_or_default();
        let mut posts = Vec::new();
        for id in feed {
            if let Some(post) = self.post(id)? {
                if filter.matches(&post) {
                    posts.push(post);
                }
            }
        }

        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    pub fn count_posts(&self, scope: PostScope<'_>) -> anyhow::Result<usize> {
        Ok(self.find_posts(scope)?.len())
    }

    /// Resolves author usernames and group titles for display.
    pub fn post_views(&self, posts: Vec<Post>) -> anyhow::Result<Vec<PostView>> {
        let mut usernames: HashMap<String, String> = HashMap::new();
        let mut groups: HashMap<String, Option<GroupRef>> = HashMap::new();
        let mut views = Vec::with_capacity(posts.len());

        for post in posts {
            let author = match usernames.get(&post.author_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .user_by_id(&post.author_id)?
                        .map(|u| u.username)
                        .unwrap_or_default();
                    usernames.insert(post.author_id.clone(), name.clone());
                    name
                }
            };

            let group = match &post.group {
                Some(slug) => match groups.get(slug) {
                    Some(cached) => cached.clone(),
                    None => {
                        let resolved = self.group(slug)?.map(|g| GroupRef {
                            slug: g.slug,
                            title: g.title,
                        });
                        groups.insert(slug.clone(), resolved.clone());
                        resolved
                    }
                },
                None => None,
            };

            views.push(PostView {
                id: post.id,
                text: post.text,
                author,
                group,
                image: post.image.map(|path| format!("/media/{}", path)),
                created_at: post.created_at,
                updated_at: post.updated_at,
            });
        }

        Ok(views)
    }

    // === Media ===

    pub fn save_image(&self, post_id: u64, bytes: &[u8]) -> anyhow::Result<()> {
        self.store.set(&media_key(post_id), bytes)
    }

    pub fn image(&self, post_id: u64) -> anyhow::Result<Option<Vec<u8>>> {
        self.store.get(&media_key(post_id))
    }

    pub fn delete_image(&self, post_id: u64) -> anyhow::Result<()> {
        self.store.delete(&media_key(post_id))
    }

    // === Comments ===

    pub fn add_comment(
        &self,
        post_id: u64,
        author_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Comment> {
        let comment = Comment {
            id: self.next_id(COMMENT_SEQ_KEY)?,
            post_id,
            author_id: author_id.to_string(),
            text: text.to_string(),
            created_at: now,
        };
        if !self.store.insert_new_json(&comment_key(comment.id), &comment)? {
            anyhow::bail!("comment {} already exists", comment.id);
        }

        self.store
            .update_json(&post_comments_key(post_id), |ids: Option<Vec<u64>>| {
                let mut ids = ids.unwrap_or_default();
                ids.push(comment.id);
                ids
            })?;

        Ok(comment)
    }

    /// Comments on a post, oldest first.
    pub fn comments_for(&self, post_id: u64) -> anyhow::Result<Vec<Comment>> {
        let ids: Vec<u64> = self
            .store
            .get_json(&post_comments_key(post_id))?
            .unwrap_or_default();
        let mut comments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(comment) = self.store.get_json::<Comment>(&comment_key(id))? {
                comments.push(comment);
            }
        }
        Ok(comments)
    }

    pub fn comment_views(&self, comments: Vec<Comment>) -> anyhow::Result<Vec<CommentView>> {
        let mut usernames: HashMap<String, String> = HashMap::new();
        let mut views = Vec::with_capacity(comments.len());
        for comment in comments {
            if !usernames.contains_key(&comment.author_id) {
                let name = self
                    .user_by_id(&comment.author_id)?
                    .map(|u| u.username)
                    .unwrap_or_default();
                usernames.insert(comment.author_id.clone(), name);
            }
            views.push(CommentView {
                id: comment.id,
                author: usernames[&comment.author_id].clone(),
                text: comment.text,
                created_at: comment.created_at,
            });
        }
        Ok(views)
    }

    // === Follow edges ===

    /// Adds the edge unless it exists or would point at the user themself.
    /// Returns the new edge, or `None` when nothing changed.
    pub fn follow(&self, user_id: &str, author_id: &str) -> anyhow::Result<Option<Follow>> {
        if user_id == author_id {
            return Ok(None);
        }

        let mut added = false;
        self.store
            .update_json(&followings_key(user_id), |ids: Option<Followings>| {
                let mut ids = ids.unwrap_or_default();
                added = !ids.iter().any(|id| id == author_id);
                if added {
                    ids.push(author_id.to_string());
                }
                ids
            })?;
        if !added {
            return Ok(None);
        }

        self.store
            .update_json(&followers_key(author_id), |ids: Option<Followers>| {
                let mut ids = ids.unwrap_or_default();
                if !ids.iter().any(|id| id == user_id) {
                    ids.push(user_id.to_string());
                }
                ids
            })?;

        Ok(Some(Follow {
            user_id: user_id.to_string(),
            author_id: author_id.to_string(),
        }))
    }

    /// Removes the edge if present. Returns whether anything was removed.
    pub fn unfollow(&self, user_id: &str, author_id: &str) -> anyhow::Result<bool> {
        let mut removed = false;
        self.store
            .update_json(&followings_key(user_id), |ids: Option<Followings>| {
                let mut ids = ids.unwrap_or_default();
                let before = ids.len();
                ids.retain(|id| id != author_id);
                removed = ids.len() != before;
                ids
            })?;

        self.store
            .update_json(&followers_key(author_id), |ids: Option<Followers>| {
                let mut ids = ids.unwrap_or_default();
                ids.retain(|id| id != user_id);
                ids
            })?;

        Ok(removed)
    }

    pub fn is_following(&self, user_id: &str, author_id: &str) -> anyhow::Result<bool> {
        Ok(self.followings(user_id)?.iter().any(|id| id == author_id))
    }

    /// Authors `user_id` follows.
    pub fn followings(&self, user_id: &str) -> anyhow::Result<Followings> {
        Ok(self
            .store
            .get_json(&followings_key(user_id))?
            .unwrap_or_default())
    }

    /// Users following `author_id`.
    pub fn followers(&self, author_id: &str) -> anyhow::Result<Followers> {
        Ok(self
            .store
            .get_json(&followers_key(author_id))?
            .unwrap_or_default())
    }

    // === Tokens ===

    pub fn save_token(&self, token: &str, data: &TokenData) -> anyhow::Result<()> {
        self.store.set_json(&token_key(token), data)
    }

    pub fn token(&self, token: &str) -> anyhow::Result<Option<TokenData>> {
        self.store.get_json(&token_key(token))
    }

    pub fn delete_token(&self, token: &str) -> anyhow::Result<()> {
        self.store.delete(&token_key(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use chrono::Duration;

    fn user(repo: &Repository<'_, MemoryStore>, name: &str) -> User {
        repo.create_user(name, &format!("{}@mail.test", name), String::new(), Utc::now())
            .unwrap()
    }

    fn group(repo: &Repository<'_, MemoryStore>, slug: &str) {
        repo.save_group(&Group {
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            description: String::new(),
        })
        .unwrap();
    }

    #[test]
    fn users_are_found_by_username() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);
        let alice = user(&repo, "alice");

        assert_eq!(repo.user_by_username("alice").unwrap(), Some(alice.clone()));
        assert_eq!(repo.user_by_id(&alice.id).unwrap().map(|u| u.username), Some("alice".into()));
        assert!(repo.user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn scopes_filter_and_order_newest_first() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);
        let alice = user(&repo, "alice");
        let bob = user(&repo, "bob");
        group(&repo, "cats");

        let t0 = Utc::now();
        let p1 = repo.create_post(&alice.id, Some("cats".into()), "one", t0).unwrap();
        let p2 = repo.create_post(&bob.id, None, "two", t0 + Duration::seconds(1)).unwrap();
        let p3 = repo.create_post(&alice.id, None, "three", t0 + Duration::seconds(2)).unwrap();

        let ids = |posts: Vec<Post>| posts.into_iter().map(|p| p.id).collect::<Vec<_>>();

        assert_eq!(ids(repo.find_posts(PostScope::All).unwrap()), vec![p3.id, p2.id, p1.id]);
        assert_eq!(ids(repo.find_posts(PostScope::Author(&alice.id)).unwrap()), vec![p3.id, p1.id]);
        assert_eq!(ids(repo.find_posts(PostScope::Group("cats")).unwrap()), vec![p1.id]);
        assert!(repo.find_posts(PostScope::FollowedBy(&alice.id)).unwrap().is_empty());

        repo.follow(&alice.id, &bob.id).unwrap();
        assert_eq!(ids(repo.find_posts(PostScope::FollowedBy(&alice.id)).unwrap()), vec![p2.id]);
        assert!(repo.find_posts(PostScope::FollowedBy(&bob.id)).unwrap().is_empty());
    }

    #[test]
    fn follow_is_unique_and_never_self() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);
        let alice = user(&repo, "alice");
        let bob = user(&repo, "bob");

        assert!(repo.follow(&alice.id, &alice.id).unwrap().is_none());
        assert!(repo.follow(&alice.id, &bob.id).unwrap().is_some());
        assert!(repo.follow(&alice.id, &bob.id).unwrap().is_none());

        assert_eq!(repo.followings(&alice.id).unwrap(), vec![bob.id.clone()]);
        assert_eq!(repo.followers(&bob.id).unwrap(), vec![alice.id.clone()]);
        assert!(repo.is_following(&alice.id, &bob.id).unwrap());

        assert!(repo.unfollow(&alice.id, &bob.id).unwrap());
        assert!(!repo.unfollow(&alice.id, &bob.id).unwrap());
        assert!(repo.followings(&alice.id).unwrap().is_empty());
        assert!(repo.followers(&bob.id).unwrap().is_empty());
    }

    #[test]
    fn comments_keep_creation_order_and_author_names() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);
        let alice = user(&repo, "alice");
        let bob = user(&repo, "bob");
        let post = repo.create_post(&alice.id, None, "hello", Utc::now()).unwrap();

        repo.add_comment(post.id, &bob.id, "first", Utc::now()).unwrap();
        repo.add_comment(post.id, &alice.id, "second", Utc::now()).unwrap();

        let views = repo.comment_views(repo.comments_for(post.id).unwrap()).unwrap();
        let summary: Vec<(&str, &str)> = views
            .iter()
            .map(|c| (c.author.as_str(), c.text.as_str()))
            .collect();
        assert_eq!(summary, vec![("bob", "first"), ("alice", "second")]);
    }

    #[test]
    fn post_views_resolve_author_and_group() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);
        let alice = user(&repo, "alice");
        group(&repo, "cats");
        let mut post = repo.create_post(&alice.id, Some("cats".into()), "meow", Utc::now()).unwrap();
        post.image = Some(format!("posts/{}.png", post.id));
        repo.save_post(&post).unwrap();

        let views = repo.post_views(repo.find_posts(PostScope::All).unwrap()).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].author, "alice");
        assert_eq!(views[0].group.as_ref().map(|g| g.title.as_str()), Some("CATS"));
        assert_eq!(views[0].image, Some(format!("/media/posts/{}.png", post.id)));
    }

    #[test]
    fn concurrent_writers_never_share_an_id() {
        let store = MemoryStore::new();
        let (alice, post) = {
            let repo = Repository::new(&store);
            let alice = user(&repo, "alice");
            let post = repo.create_post(&alice.id, None, "thread", Utc::now()).unwrap();
            (alice, post)
        };

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let repo = Repository::new(&store);
                    for n in 0..200 {
                        repo.create_post(&alice.id, None, &n.to_string(), Utc::now())
                            .unwrap();
                        repo.add_comment(post.id, &alice.id, "hi", Utc::now()).unwrap();
                    }
                });
            }
        });

        let repo = Repository::new(&store);
        let posts = repo.find_posts(PostScope::All).unwrap();
        assert_eq!(posts.len(), 1 + 8 * 200);
        let ids: HashSet<u64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), posts.len());
        assert_eq!(repo.comments_for(post.id).unwrap().len(), 8 * 200);
    }

    #[test]
    fn existing_records_are_never_overwritten() {
        let store = MemoryStore::new();
        let repo = Repository::new(&store);
        let alice = user(&repo, "alice");
        let first = repo.create_post(&alice.id, None, "first", Utc::now()).unwrap();

        // rewind the sequence so the next id collides
        store.set_json(POST_SEQ_KEY, &0u64).unwrap();
        assert!(repo.create_post(&alice.id, None, "second", Utc::now()).is_err());
        assert_eq!(repo.post(first.id).unwrap().unwrap().text, "first");

        assert!(repo
            .create_user("alice", "", String::new(), Utc::now())
            .is_err());
    }
}
