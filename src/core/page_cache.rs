use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{page_cache_key, PAGE_CACHE_INDEX_KEY};
use crate::core::store::KvStore;

/// A rendered response kept for a fixed window. Entries live in the
/// key-value store so the window survives between Spin component instances.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CachedPage {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub expires_at: DateTime<Utc>,
}

/// One live entry in the cache index, oldest first.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct IndexEntry {
    key: String,
    expires_at: DateTime<Utc>,
}

/// Time-based page cache. Writes never invalidate it; entries only expire.
/// Every `put` sweeps expired entries and evicts the oldest ones beyond
/// `max_entries`, so the store holds a bounded number of pages.
pub struct PageCache<'a, S: KvStore> {
    store: &'a S,
    ttl: Duration,
    max_entries: usize,
}

impl<'a, S: KvStore> PageCache<'a, S> {
    pub fn new(store: &'a S, ttl_seconds: i64, max_entries: usize) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_seconds),
            max_entries,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl > Duration::zero() && self.max_entries > 0
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> anyhow::Result<Option<CachedPage>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let store_key = page_cache_key(key);
        match self.store.get_json::<CachedPage>(&store_key)? {
            Some(page) if now < page.expires_at => Ok(Some(page)),
            Some(_) => {
                self.store.delete(&store_key)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn put(
        &self,
        key: &str,
        status: u16,
        content_type: &str,
        body: String,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let page = CachedPage {
            status,
            content_type: content_type.to_string(),
            body,
            expires_at: now + self.ttl,
        };

        let mut dropped: Vec<String> = Vec::new();
        self.store
            .update_json(PAGE_CACHE_INDEX_KEY, |index: Option<Vec<IndexEntry>>| {
                dropped.clear();
                let mut live = Vec::new();
                for entry in index.unwrap_or_default() {
                    if entry.key == key {
                        continue;
                    }
                    if entry.expires_at <= now {
                        dropped.push(entry.key);
                    } else {
                        live.push(entry);
                    }
                }
                while live.len() >= self.max_entries {
                    dropped.push(live.remove(0).key);
                }
                live.push(IndexEntry {
                    key: key.to_string(),
                    expires_at: page.expires_at,
                });
                live
            })?;

        for old in &dropped {
            self.store.delete(&page_cache_key(old))?;
        }
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "page cache entries dropped");
        }

        self.store.set_json(&page_cache_key(key), &page)
    }
}

/// Cache key for a route: the path plus the `vary_on` query parameters in
/// sorted order. Other parameters do not create entries of their own.
pub fn cache_key(path: &str, params: &HashMap<String, String>, vary_on: &[&str]) -> String {
    let mut pairs: Vec<(&String, &String)> = params
        .iter()
        .filter(|(k, _)| vary_on.contains(&k.as_str()))
        .collect();
    pairs.sort();
    let query: Vec<String> = pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query.join("&"))
    }
}
