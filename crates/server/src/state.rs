//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::middleware::SubmissionLimiter;
use crate::services::auth::{AuthService, TokenIssuer};
use crate::services::complaints::ComplaintService;
use crate::services::email::Mailer;
use crate::services::notifications::{EventSink, NotificationDispatcher};
use crate::services::settings::SettingsService;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Everything a request needs is constructed
/// once here and injected; nothing lives in globals.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<ServerConfig>,
    store: Store,
    limiter: SubmissionLimiter,
    mailer: Arc<dyn Mailer>,
    tokens: TokenIssuer,
    events: Arc<dyn EventSink>,
}

impl AppState {
    /// Create a new application state with the email notification dispatcher.
    #[must_use]
    pub fn new(config: ServerConfig, store: Store, mailer: Arc<dyn Mailer>) -> Self {
        let config = Arc::new(config);
        let events = Arc::new(NotificationDispatcher::new(
            store.users.clone(),
            store.settings.clone(),
            mailer.clone(),
            config.clone(),
        ));
        Self::with_events(config, store, mailer, events)
    }

    /// Create a new application state with a custom event sink.
    #[must_use]
    pub fn with_events(
        config: Arc<ServerConfig>,
        store: Store,
        mailer: Arc<dyn Mailer>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let limiter = SubmissionLimiter::new(config.rate_limit);
        let tokens = TokenIssuer::new(&config.auth.jwt_secret, config.auth.token_ttl);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                limiter,
                mailer,
                tokens,
                events,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    #[must_use]
    pub fn limiter(&self) -> &SubmissionLimiter {
        &self.inner.limiter
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    // =========================================================================
    // Services
    // =========================================================================

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            self.inner.store.users.as_ref(),
            self.inner.store.settings.as_ref(),
            &self.inner.tokens,
            &self.inner.config.auth,
        )
    }

    #[must_use]
    pub fn complaints(&self) -> ComplaintService<'_> {
        ComplaintService::new(
            self.inner.store.complaints.as_ref(),
            self.inner.events.as_ref(),
        )
    }

    #[must_use]
    pub fn settings(&self) -> SettingsService<'_> {
        SettingsService::new(
            self.inner.store.settings.as_ref(),
            self.inner.mailer.as_ref(),
            &self.inner.config,
        )
    }
}
