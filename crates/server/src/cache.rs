use std::time::{Duration, Instant};

use shared::domain::Meal;
use tokio::sync::Mutex;

struct CachedList {
    meals: Vec<Meal>,
    expires_at: Instant,
}

/// Read cache for the full collection. An entry lives for a fixed TTL and
/// is dropped on every insert, so list responses never lag a create.
pub struct ListCache {
    ttl: Duration,
    inner: Mutex<Option<CachedList>>,
}

impl ListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Option<Vec<Meal>> {
        let mut guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(cached) if cached.expires_at > Instant::now() => Some(cached.meals.clone()),
            Some(_) => {
                *guard = None;
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, meals: Vec<Meal>) {
        *self.inner.lock().await = Some(CachedList {
            meals,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}
