//! Fixtures for in-crate tests.

use std::sync::Arc;

use crate::core::config::{AppConfig, PasswordConfig};
use crate::core::shared::state::AppState;
use crate::core::storage::MemoryStore;
use crate::email::LogNotifier;

pub const TEST_JWT_SECRET: &str = "unit-test-signing-secret-0123456789abcdef";

/// Config with a fixed signing key and cheap Argon2 parameters.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt.secret = TEST_JWT_SECRET.to_string();
    config.password = PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config
}

/// Application state over an empty in-memory store.
pub fn test_state() -> AppState {
    AppState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(LogNotifier),
    )
    .expect("test state")
}
