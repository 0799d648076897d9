//! Environment snapshot/restore for tests that touch process variables.

use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Process-wide lock serializing every environment mutation made by tests.
///
/// A poisoned lock (a test panicked while holding it) is recovered, since the
/// guard that panicked already restored the environment on unwind.
pub fn process_env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Snapshot of the process environment, restored when dropped.
///
/// Holds the process-wide environment lock for its whole lifetime, so only
/// one guard may be alive per thread; creating a second one deadlocks.
///
/// ```ignore
/// let mut env = EnvGuard::new();
/// env.set("TESTOBJECT_API_KEY", "foobar");
/// env.remove("TESTOBJECT_DEVICE");
/// // ... on drop every variable is back to its previous value
/// ```
pub struct EnvGuard {
    snapshot: Vec<(OsString, OsString)>,
    _lock: MutexGuard<'static, ()>,
}

#[allow(unsafe_code)]
impl EnvGuard {
    pub fn new() -> Self {
        let lock = process_env_lock();
        Self {
            snapshot: std::env::vars_os().collect(),
            _lock: lock,
        }
    }

    /// Set a variable for the lifetime of the guard.
    pub fn set(&mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) {
        // SAFETY: every mutation goes through the process env lock held by self.
        unsafe { std::env::set_var(key, value) };
    }

    /// Remove a variable for the lifetime of the guard.
    pub fn remove(&mut self, key: &str) {
        // SAFETY: every mutation goes through the process env lock held by self.
        unsafe { std::env::remove_var(key) };
    }

    fn restore(&self) {
        let current: Vec<OsString> = std::env::vars_os().map(|(k, _)| k).collect();
        for key in current {
            if !self.snapshot.iter().any(|(k, _)| *k == key) {
                // SAFETY: the env lock is still held by self.
                unsafe { std::env::remove_var(&key) };
            }
        }
        for (key, value) in &self.snapshot {
            if std::env::var_os(key).as_ref() != Some(value) {
                // SAFETY: the env lock is still held by self.
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

impl Default for EnvGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_undone_on_drop() {
        {
            let mut guard = EnvGuard::new();
            guard.remove("TCS_ENV_GUARD_SET");
        }
        {
            let mut guard = EnvGuard::new();
            guard.set("TCS_ENV_GUARD_SET", "value");
            assert_eq!(std::env::var("TCS_ENV_GUARD_SET").unwrap(), "value");
        }
        let _guard = EnvGuard::new();
        assert!(std::env::var("TCS_ENV_GUARD_SET").is_err());
    }

    #[test]
    fn test_remove_is_undone_on_drop() {
        {
            let mut outer = EnvGuard::new();
            outer.set("TCS_ENV_GUARD_KEEP", "original");
            // Leak the mutation past this guard by rebuilding the snapshot.
            outer.snapshot = std::env::vars_os().collect();
        }
        {
            let mut guard = EnvGuard::new();
            guard.remove("TCS_ENV_GUARD_KEEP");
            assert!(std::env::var("TCS_ENV_GUARD_KEEP").is_err());
        }
        let mut guard = EnvGuard::new();
        assert_eq!(std::env::var("TCS_ENV_GUARD_KEEP").unwrap(), "original");
        guard.remove("TCS_ENV_GUARD_KEEP");
        guard.snapshot.retain(|(k, _)| k != "TCS_ENV_GUARD_KEEP");
    }

    #[test]
    fn test_overwrite_is_undone_on_drop() {
        let mut guard = EnvGuard::new();
        guard.set("TCS_ENV_GUARD_OVERWRITE", "before");
        guard.snapshot = std::env::vars_os().collect();
        {
            // Restore inside this guard's lifetime without dropping the lock.
            guard.set("TCS_ENV_GUARD_OVERWRITE", "after");
            guard.restore();
        }
        assert_eq!(std::env::var("TCS_ENV_GUARD_OVERWRITE").unwrap(), "before");
        guard.remove("TCS_ENV_GUARD_OVERWRITE");
        guard.snapshot.retain(|(k, _)| k != "TCS_ENV_GUARD_OVERWRITE");
    }
}
