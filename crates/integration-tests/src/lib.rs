//! Integration tests for Compass.
//!
//! Each [`TestContext`] boots the real router on an ephemeral port with
//! in-memory storage and a recording mailer, and drives it over HTTP with
//! `reqwest`. Contexts share nothing, so tests can run in parallel.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p compass-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use compass_core::{Email, Role};
use compass_server::config::ServerConfig;
use compass_server::db::{MemoryStore, SettingsRepository, Store, UserRepository};
use compass_server::models::{NewUser, SystemSettings};
use compass_server::services::auth::hash_password;
use compass_server::services::email::{MemoryMailer, OutgoingEmail};
use compass_server::{AppState, app};

/// Demo administrator password configured by [`test_config`].
pub const DEMO_PASSWORD: &str = "Demo!Pass-2026";

/// Administrator registration key configured by [`test_config`].
pub const ADMIN_KEY: &str = "registration-key-for-tests";

/// Password used for accounts created with [`TestContext::create_user`].
pub const PASSWORD: &str = "Str0ng!Passw0rd";

/// In-memory configuration with the demo login and registration key enabled.
#[must_use]
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::in_memory(SecretString::from(
        "k3Jx9!vQ2mZp7#Lw4Rt8@Yh1Nc6$Bd0Fs5",
    ));
    config.auth.demo_password = Some(SecretString::from(DEMO_PASSWORD));
    config.auth.admin_registration_key = Some(SecretString::from(ADMIN_KEY));
    config
}

/// A running server plus handles on its storage and outbox.
pub struct TestContext {
    pub base_url: String,
    /// Client with a cookie jar.
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MemoryMailer>,
    server: JoinHandle<()>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        Self::with_mailer(config, MemoryMailer::new()).await
    }

    /// Boot with a specific mailer, such as [`MemoryMailer::failing`].
    pub async fn with_mailer(config: ServerConfig, mailer: MemoryMailer) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(mailer);
        let state = AppState::new(config, Store::from_memory(&store), mailer.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local address");

        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("test server");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: client(),
            store,
            mailer,
            server,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Store an account directly, bypassing registration.
    pub async fn create_user(&self, email: &str, role: Role) {
        self.store
            .create(NewUser {
                email: Email::parse(email).expect("valid email"),
                password_hash: hash_password(PASSWORD).expect("hash password"),
                role,
            })
            .await
            .expect("create user");
    }

    /// Log in with `client` and return the session token.
    pub async fn login(&self, client: &Client, email: &str, password: &str) -> String {
        let response = client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request");
        assert_eq!(response.status(), 200, "login as {email}");
        let body: Value = response.json().await.expect("login body");
        body["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_owned()
    }

    /// Create an administrator and return a client logged in as them.
    pub async fn admin_client(&self, email: &str) -> Client {
        self.create_user(email, Role::Admin).await;
        let admin = client();
        self.login(&admin, email, PASSWORD).await;
        admin
    }

    /// Submit the reference complaint and return the created record.
    pub async fn submit(&self, title: &str) -> Value {
        let response = self
            .client
            .post(self.url("/complaints"))
            .json(&json!({
                "title": title,
                "description": "No internet for 2 days in room 4",
                "category": "Service",
                "priority": "High",
            }))
            .send()
            .await
            .expect("submit request");
        assert_eq!(response.status(), 201, "submit {title}");
        let body: Value = response.json().await.expect("submit body");
        body["data"].clone()
    }

    /// Store working mail settings with `ops@example.com` as admin address.
    pub async fn configure_mail(&self) {
        let settings = SystemSettings {
            smtp_host: "smtp.example.com".to_owned(),
            smtp_port: 587,
            smtp_user: "mailer@example.com".to_owned(),
            smtp_pass: SecretString::from("app-password"),
            admin_email: "ops@example.com".to_owned(),
            base_url: "http://localhost:3000".to_owned(),
            system_name: "Compass".to_owned(),
            last_updated: None,
        };
        self.store
            .save_system(&settings, Utc::now())
            .await
            .expect("save settings");
    }

    /// Wait until at least `count` messages were sent, or two seconds passed.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..100 {
            let sent = self.mailer.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.mailer.sent().await
    }

    /// Give detached notification tasks time to finish, then return the outbox.
    pub async fn settle_mail(&self) -> Vec<OutgoingEmail> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.mailer.sent().await
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A fresh client with its own cookie jar.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("build reqwest client")
}
