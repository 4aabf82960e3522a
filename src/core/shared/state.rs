use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::storage::CrmStore;
use crate::email::Notifier;
use crate::security::jwt::TokenService;
use crate::security::password::PasswordHasher;

/// Everything a request handler can reach. Built once at startup and shared
/// behind an `Arc`.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn CrmStore>,
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<PasswordHasher>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CrmStore>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::from_config(&config.jwt)?;
        let passwords = PasswordHasher::from_config(&config.password)?;
        Ok(Self {
            config,
            store,
            tokens: Arc::new(tokens),
            passwords: Arc::new(passwords),
            notifier,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server", &self.config.server)
            .field("email_enabled", &self.config.email.enabled)
            .finish_non_exhaustive()
    }
}
