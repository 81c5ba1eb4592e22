use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Byte-oriented key-value storage. Everything the service persists goes
/// through this trait, so handlers run unchanged on Spin and natively.
pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Read-modify-write of one key. `f` receives the current value and
    /// returns the replacement. Backends that can run this atomically do.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let current = self.get(key)?;
        let next = f(current.as_deref())?;
        self.set(key, &next)
    }

    /// Writes `value` only when `key` is absent. Returns whether it wrote.
    fn insert_new(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        if self.get(key)?.is_some() {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()>
    where
        Self: Sized,
    {
        self.set(key, &serde_json::to_vec(value)?)
    }

    fn insert_new_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<bool>
    where
        Self: Sized,
    {
        self.insert_new(key, &serde_json::to_vec(value)?)
    }

    /// [`KvStore::update`] over a JSON value; returns the value written.
    fn update_json<T, F>(&self, key: &str, mut f: F) -> anyhow::Result<T>
    where
        Self: Sized,
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> T,
    {
        let mut written = None;
        self.update(key, &mut |current| {
            let current = match current {
                Some(bytes) => Some(serde_json::from_slice(bytes)?),
                None => None,
            };
            let next = f(current);
            let bytes = serde_json::to_vec(&next)?;
            written = Some(next);
            Ok(bytes)
        })?;
        written.ok_or_else(|| anyhow::anyhow!("update of {} wrote nothing", key))
    }
}

/// Process-local store used by the native server and the tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let mut entries = self.entries()?;
        let next = f(entries.get(key).map(Vec::as_slice))?;
        entries.insert(key.to_string(), next);
        Ok(())
    }

    fn insert_new(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        let mut entries = self.entries()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }
}

#[cfg(target_arch = "wasm32")]
pub use spin_backend::SpinStore;

#[cfg(target_arch = "wasm32")]
mod spin_backend {
    use super::KvStore;
    use spin_sdk::key_value::Store;

    /// The Spin component's default key-value store.
    pub struct SpinStore(Store);

    impl SpinStore {
        pub fn open_default() -> anyhow::Result<Self> {
            Store::open_default()
                .map(SpinStore)
                .map_err(|e| anyhow::anyhow!("failed to open default store: {:?}", e))
        }
    }

    impl KvStore for SpinStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.0
                .get(key)
                .map_err(|e| anyhow::anyhow!("kv get {}: {:?}", key, e))
        }

        fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
            self.0
                .set(key, value)
                .map_err(|e| anyhow::anyhow!("kv set {}: {:?}", key, e))
        }

        fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.0
                .delete(key)
                .map_err(|e| anyhow::anyhow!("kv delete {}: {:?}", key, e))
        }
    }
}
