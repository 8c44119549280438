//! Shared application state, handed to every axum handler and to the
//! scheduler loop as an `Arc<AppState>`.

use std::sync::Arc;

use lockbox_browser::BrowserDriver;
use lockbox_domain::config::Config;
use lockbox_portal::PortalClient;
use lockbox_store::{BlobStore, PrivateStore, SharedStore};
use lockbox_vault::Vault;
use parking_lot::Mutex;

use crate::scheduler::Scheduler;

/// The current school day's cycle name, as discovered by the most recent
/// `check-day` run. Reset to `None` on startup so a fresh process always
/// forces an early `check-day` before trusting any cached value.
#[derive(Default)]
pub struct CurrentDay {
    inner: Mutex<Option<i32>>,
}

impl CurrentDay {
    /// `Some(n)` for cycle day `n` (1..=4), `Some(-1)` for "no school today".
    pub fn get(&self) -> Option<i32> {
        *self.inner.lock()
    }

    pub fn set(&self, day: i32) {
        *self.inner.lock() = Some(day);
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub private: Arc<PrivateStore>,
    pub shared: Arc<SharedStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub vault: Arc<Vault>,
    pub portal: Arc<dyn PortalClient>,
    pub browser: Arc<dyn BrowserDriver>,
    pub scheduler: Arc<Scheduler>,
    pub current_day: Arc<CurrentDay>,
}
