//! Invocation gate: per-user serialization of tool calls.
//!
//! Every externally-invoked tool that touches a user's records holds that
//! user's mutex for the whole handler. Calls with no user ID share one
//! fallback mutex. Background executors never take these locks; they
//! coordinate through the store mutexes instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

pub struct InvocationGate {
    users: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    shared: Arc<Mutex<()>>,
}

impl InvocationGate {
    pub fn new() -> Self {
        Self {
            users: StdMutex::new(HashMap::new()),
            shared: Arc::new(Mutex::new(())),
        }
    }

    /// The mutex guarding `user_id`'s records. The same `Arc` is returned on
    /// every call for a given user.
    pub fn lock_for(&self, user_id: Option<&str>) -> Arc<Mutex<()>> {
        let Some(user_id) = user_id.map(str::trim).filter(|uid| !uid.is_empty()) else {
            return self.shared.clone();
        };
        let mut users = self
            .users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for InvocationGate {
    fn default() -> Self {
        Self::new()
    }
}
