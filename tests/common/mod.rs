#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crmserver::core::config::{AppConfig, PasswordConfig};
use crmserver::core::shared::enums::{ActivityStatus, Role, TicketPriority, TicketStatus};
use crmserver::core::shared::models::{NewCustomer, NewEmployee, NewTicket};
use crmserver::core::shared::state::AppState;
use crmserver::core::storage::MemoryStore;
use crmserver::email::{Notification, NotifyError, Notifier};
use crmserver::main_module::build_router;

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "s3cret-pass";

/// Captures notifications instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock").clone()
    }

    /// Dispatch is spawned, so give it a moment to land.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..50 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push(notification.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub notifier: Arc<RecordingNotifier>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.jwt.secret = JWT_SECRET.to_string();
        config.password = PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };

        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(
            AppState::new(config, Arc::new(MemoryStore::new()), notifier.clone())
                .expect("app state"),
        );
        let router = build_router(state.clone());
        Self {
            state,
            notifier,
            router,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request("POST", uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request("PUT", uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request("DELETE", uri, token, None).await
    }

    /// Inserts an active staff member whose password is [`PASSWORD`].
    pub async fn seed_employee(&self, name: &str, email: &str, role: Role) -> i64 {
        let now = Utc::now();
        let hash = self.state.passwords.hash(PASSWORD).expect("hash");
        self.state
            .store
            .create_employee(NewEmployee {
                name: name.to_string(),
                email: email.to_string(),
                phone_number: None,
                address: None,
                city: None,
                state: None,
                role,
                status: ActivityStatus::Active,
                password_hash: Some(hash),
                has_password: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed employee")
            .id
    }

    /// Inserts a customer the way staff would, without a password.
    pub async fn seed_customer(&self, name: &str, email: &str) -> i64 {
        let now = Utc::now();
        self.state
            .store
            .create_customer(NewCustomer {
                name: name.to_string(),
                email: email.to_string(),
                phone_number: None,
                address: None,
                city: None,
                state: None,
                zip_code: None,
                country: None,
                website: None,
                customer_type: Default::default(),
                status: ActivityStatus::Active,
                password_hash: None,
                has_password: false,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed customer")
            .id
    }

    pub async fn seed_ticket(&self, title: &str, customer_id: Option<i64>) -> i64 {
        let now = Utc::now();
        self.state
            .store
            .create_ticket(NewTicket {
                title: title.to_string(),
                description: Some(format!("{title} (reported)")),
                status: TicketStatus::Open,
                priority: TicketPriority::High,
                customer_id,
                employee_id: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed ticket")
            .id
    }

    pub fn token_for(&self, identity: &str, role: Role, user_id: i64) -> String {
        self.state
            .tokens
            .issue(identity, role, user_id)
            .expect("token")
    }
}
