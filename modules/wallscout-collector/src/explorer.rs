//! Memoized author lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use wallscout_common::json::{is_truthy, value_to_string};
use wallscout_common::{User, WallScoutError};

use crate::traits::UserLookup;

#[derive(Default)]
struct Cache {
    entries: HashMap<i64, User>,
    order: VecDeque<i64>,
}

/// Resolves user ids to `{name, blacklisted}` and remembers the answer.
///
/// Ids the lookup does not know resolve to [`User::anonymous`] and are cached
/// like any other hit. Failures are not cached. With a capacity set, the oldest
/// entry is evicted first; without one the cache lives as long as the process.
pub struct UserExplorer {
    lookup: Arc<dyn UserLookup>,
    capacity: Option<usize>,
    cache: Mutex<Cache>,
}

impl UserExplorer {
    pub fn new(lookup: Arc<dyn UserLookup>, capacity: Option<usize>) -> Self {
        Self {
            lookup,
            capacity,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub async fn explore(&self, id: i64) -> Result<User, WallScoutError> {
        if let Some(user) = self.cached(id) {
            return Ok(user);
        }

        let key = id.to_string();
        let body = self.lookup.user_listing(&key).await?;
        let user = resolve_user(&key, &body)?;
        if user.is_anonymous() {
            debug!(user_id = id, "User not found in listing, caching anonymous");
        }

        self.remember(id, user.clone());
        Ok(user)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.entries.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, id: i64) -> Option<User> {
        let cache = self.cache.lock().ok()?;
        cache.entries.get(&id).cloned()
    }

    fn remember(&self, id: i64, user: User) {
        let Ok(mut cache) = self.cache.lock() else {
            warn!(user_id = id, "User cache lock poisoned, result not cached");
            return;
        };
        if cache.entries.insert(id, user).is_some() {
            return;
        }
        cache.order.push_back(id);

        if let Some(capacity) = self.capacity {
            while cache.entries.len() > capacity {
                let Some(oldest) = cache.order.pop_front() else {
                    break;
                };
                cache.entries.remove(&oldest);
            }
        }
    }
}

/// Pick the entry for `id` out of a `users.get` body.
///
/// Entries are matched on `id`, then the legacy `uid`, compared as strings.
pub fn resolve_user(id: &str, body: &str) -> Result<User, WallScoutError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| WallScoutError::DataShape(format!("User listing is not json: {e}")))?;
    let entries = data
        .get("response")
        .and_then(Value::as_array)
        .ok_or_else(|| WallScoutError::DataShape("User listing has no \"response\" array".to_string()))?;

    let matched = entries.iter().find(|entry| {
        ["id", "uid"].iter().any(|key| {
            entry
                .get(*key)
                .and_then(value_to_string)
                .is_some_and(|v| v == id)
        })
    });

    let Some(entry) = matched else {
        return Ok(User::anonymous());
    };

    let name = entry
        .get("first_name")
        .and_then(Value::as_str)
        .ok_or_else(|| WallScoutError::DataShape(format!("User {id} has no key \"first_name\"")))?;

    Ok(User {
        name: name.to_string(),
        blacklisted: is_truthy(entry.get("blacklisted")),
    })
}
