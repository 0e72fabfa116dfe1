//! Trailing-edge debouncer keyed by an arbitrary value.
//!
//! Each `schedule` for a key replaces the pending payload and restarts the
//! delay. The action runs once per quiet period with the last payload.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub type DebounceAction<K, P> = Arc<dyn Fn(K, P) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending {
    generation: u64,
    timer: JoinHandle<()>,
}

struct State<K> {
    next_generation: u64,
    pending: HashMap<K, Pending>,
}

pub struct Debouncer<K, P> {
    action: DebounceAction<K, P>,
    state: Arc<Mutex<State<K>>>,
}

impl<K, P> Clone for Debouncer<K, P> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            state: self.state.clone(),
        }
    }
}

impl<K, P> Debouncer<K, P>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
    P: Send + 'static,
{
    pub fn new(action: DebounceAction<K, P>) -> Self {
        Self {
            action,
            state: Arc::new(Mutex::new(State {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, key: K, payload: P, delay: Duration) {
        let mut state = lock(&self.state);
        state.next_generation += 1;
        let generation = state.next_generation;

        let timer = {
            let key = key.clone();
            let action = self.action.clone();
            let shared = self.state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // Claim the slot; a newer schedule or a cancel wins over us.
                let owned = {
                    let mut state = lock(&shared);
                    match state.pending.get(&key) {
                        Some(p) if p.generation == generation => {
                            state.pending.remove(&key);
                            true
                        }
                        _ => false,
                    }
                };
                if owned {
                    action(key, payload).await;
                }
            })
        };

        if let Some(previous) = state.pending.insert(key.clone(), Pending { generation, timer }) {
            previous.timer.abort();
            debug!(key = ?key, "debounce timer reset");
        }
    }

    /// Drop the pending payload for `key` without firing. Returns whether one existed.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.state).pending.remove(key) {
            Some(p) => {
                p.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, p) in lock(&self.state).pending.drain() {
            p.timer.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.state).pending.contains_key(key)
    }
}

fn lock<K>(state: &Mutex<State<K>>) -> MutexGuard<'_, State<K>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
