//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::auth::AuthRepo;
use crate::config::Config;
use litera_core::ports::ReadingStore;
use litera_core::tracker::ReadingTracker;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub tracker: ReadingTracker,
    pub auth: AuthRepo,
    pub config: Arc<Config>,
}
