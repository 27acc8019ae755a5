//! Shared harness for the integration tests: an in-memory store, the full
//! router on top of it and signed tokens for seeded users.

#![allow(dead_code)]

use std::str::FromStr;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use bigdecimal::BigDecimal;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use storefront::AppState;
use storefront::api::routes::create_router;
use storefront::db::{DbPool, MemoryStore};
use storefront::models::Role;
use storefront::services::AuthUser;
use storefront::utils::jwt::generate_access_token;

pub const SECRET: &str = "integration-secret-0123456789abcdef";

pub struct TestApp {
    pub store: MemoryStore,
    pub state: AppState,
    pub router: Router,
    pub customer: AuthUser,
    pub admin: AuthUser,
    pub widget: i32,
    pub gadget: i32,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool(4, Duration::from_millis(500)).await
    }

    pub async fn with_pool(max_size: u32, acquire_timeout: Duration) -> Self {
        let store = MemoryStore::new();
        let customer = store.add_user("alice", Role::Customer, true).await;
        let admin = store.add_user("root", Role::Admin, true).await;
        let widget = store.add_product("Widget", decimal("10.00")).await;
        let gadget = store.add_product("Gadget", decimal("4.50")).await;

        let pool = DbPool::memory(store.clone(), max_size, acquire_timeout);
        let state = AppState::new(pool, SECRET);
        let router = create_router(state.clone(), Duration::from_secs(5));

        Self {
            store,
            state,
            router,
            customer: AuthUser {
                user_id: customer,
                role: Role::Customer,
            },
            admin: AuthUser {
                user_id: admin,
                role: Role::Admin,
            },
            widget,
            gadget,
        }
    }

    pub fn token_for(&self, user: &AuthUser) -> String {
        generate_access_token(
            user.user_id,
            format!("user{}@example.com", user.user_id),
            user.role,
            SECRET,
            1,
        )
        .unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn request_as(
        &self,
        user: &AuthUser,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let token = self.token_for(user);
        self.request(method, uri, body, Some(&token)).await
    }
}

pub fn decimal(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
