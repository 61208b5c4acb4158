//! Drop-restored environment overrides for `BLOCKSPARSE_*` tests.
//!
//! Prefer `temp_env::with_vars` with `#[serial(blocksparse_env)]`. Use
//! [`EnvGuard`] when a test needs several sequential steps under one
//! environment; it still has to run under `#[serial(blocksparse_env)]`.

use std::env;
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

/// Captures one variable on creation and restores it on drop.
#[derive(Debug)]
pub struct EnvGuard {
    key: String,
    old: Option<String>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    pub fn new(key: &str) -> Self {
        let lock = env_lock().lock().unwrap_or_else(|e| e.into_inner());
        Self { key: key.to_string(), old: env::var(key).ok(), _lock: lock }
    }

    pub fn set(&self, val: &str) {
        // SAFETY: ENV_LOCK is held and callers serialize on `blocksparse_env`.
        unsafe {
            env::set_var(&self.key, val);
        }
    }

    pub fn remove(&self) {
        // SAFETY: as in `set`.
        unsafe {
            env::remove_var(&self.key);
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: the lock is still held until this guard's fields drop.
        unsafe {
            match &self.old {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }
}
