#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};

use bearer_auth::config::{self, ConfigOption};

/// Integration tests in one binary share the process-wide configuration.
static CONFIG_LOCK: Mutex<()> = Mutex::new(());

pub const TEST_KEY: &str = "test-secret-key";
pub const TEST_IDENTITY_KEY: &str = "user_id";

/// Exclusive access to the global configuration for the duration of a test.
/// Restores the defaults when dropped.
pub struct ConfigGuard {
    _lock: MutexGuard<'static, ()>,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        config::reset();
    }
}

/// Take the lock and install a fresh configuration.
pub fn init_config<I>(key: &str, options: I) -> ConfigGuard
where
    I: IntoIterator<Item = ConfigOption>,
{
    // A failed test poisons the lock; later tests still reset the state.
    let lock = CONFIG_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    config::reset();
    config::init(key, options).expect("Failed to initialize test configuration");
    ConfigGuard { _lock: lock }
}

/// Take the lock without touching the configuration beyond a reset.
pub fn lock_config() -> ConfigGuard {
    let lock = CONFIG_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    config::reset();
    ConfigGuard { _lock: lock }
}
