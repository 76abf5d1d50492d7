//! Process-wide configuration.
//!
//! Code that has no manager threaded through to it reads the shared one:
//!
//! ```ignore
//! autotest::config::global::init(ConfigOptions::new().env("test"))?;
//! let base = autotest::config::global::get().get_str("web.base_url", "");
//! ```

use super::{ConfigManager, ConfigOptions};
use crate::result::AutomationResult;
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

static GLOBAL: OnceLock<RwLock<ConfigManager>> = OnceLock::new();

fn cell() -> &'static RwLock<ConfigManager> {
    GLOBAL.get_or_init(|| {
        let manager = ConfigManager::new(ConfigOptions::default()).unwrap_or_else(|e| {
            warn!(error = %e, "default configuration failed to load");
            ConfigManager::empty()
        });
        RwLock::new(manager)
    })
}

/// Load the global manager from `options`, replacing whatever it held.
///
/// # Errors
///
/// Propagates [`ConfigManager::new`] errors; the previous configuration is
/// kept in that case.
pub fn init(options: ConfigOptions) -> AutomationResult<()> {
    let manager = ConfigManager::new(options)?;
    match GLOBAL.get() {
        Some(lock) => *lock.write().unwrap_or_else(PoisonError::into_inner) = manager,
        None => {
            if let Err(fresh) = GLOBAL.set(RwLock::new(manager)) {
                let manager = fresh.into_inner().unwrap_or_else(PoisonError::into_inner);
                *cell().write().unwrap_or_else(PoisonError::into_inner) = manager;
            }
        }
    }
    Ok(())
}

/// Read access, loading defaults on first use
pub fn get() -> RwLockReadGuard<'static, ConfigManager> {
    cell().read().unwrap_or_else(PoisonError::into_inner)
}

/// Write access, loading defaults on first use
pub fn get_mut() -> RwLockWriteGuard<'static, ConfigManager> {
    cell().write().unwrap_or_else(PoisonError::into_inner)
}
