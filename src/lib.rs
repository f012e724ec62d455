// Core modules
pub mod config;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod models;
pub mod monitor;
pub mod risk;
pub mod session;
pub mod sim;
pub mod strategy;

// Re-export commonly used types
pub use error::EngineError;
pub use models::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Error handling
pub type Result<T> = anyhow::Result<T>;

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
