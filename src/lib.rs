//! Pustaka library loan ledger
//!
//! Tracks book stock, multi-book loans, overdue fines and their settlement,
//! and exposes the ledger through a REST JSON API with statistics and reports.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
