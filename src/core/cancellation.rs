use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Latest in-flight request token per key.
///
/// Starting a request for a key cancels the token of the request it
/// supersedes. A finished request releases its entry only while the map still
/// holds its own token, so a slow superseded request cannot remove the token
/// of the request that replaced it.
#[derive(Default)]
pub struct InFlightRegistry {
    tokens: Arc<Mutex<HashMap<String, Arc<CancellationToken>>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request under `key`, cancelling any previous one
    pub fn begin(&self, key: &str) -> InFlightGuard {
        let token = Arc::new(CancellationToken::new());

        if let Ok(mut tokens) = self.tokens.lock() {
            if let Some(previous) = tokens.insert(key.to_string(), token.clone()) {
                debug!(query = %key, "superseding in-flight request");
                previous.cancel();
            }
        }

        InFlightGuard {
            key: key.to_string(),
            token,
            tokens: self.tokens.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is currently mapped to exactly `token`
    pub fn is_current(&self, key: &str, token: &CancellationToken) -> bool {
        self.tokens
            .lock()
            .map(|tokens| {
                tokens
                    .get(key)
                    .is_some_and(|current| std::ptr::eq(current.as_ref(), token))
            })
            .unwrap_or(false)
    }

    pub fn cancel_all(&self) {
        if let Ok(mut tokens) = self.tokens.lock() {
            for (_, token) in tokens.drain() {
                token.cancel();
            }
        }
    }
}

/// Ownership of one in-flight entry, released on drop
pub struct InFlightGuard {
    key: String,
    token: Arc<CancellationToken>,
    tokens: Arc<Mutex<HashMap<String, Arc<CancellationToken>>>>,
}

impl InFlightGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let Ok(mut tokens) = self.tokens.lock() else {
            return;
        };
        let owned = tokens
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.token));
        if owned {
            tokens.remove(&self.key);
        }
    }
}
