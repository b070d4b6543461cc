//! Supabase auth admin client.

use crate::config::AuthConfig;
use crate::error::{MigrateError, Result};
use crate::identity::IdentityProvider;
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for `POST /auth/v1/admin/users`.
pub struct SupabaseAuthClient {
    base_url: String,
    service_role_key: String,
    client: ReqwestClient,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedUser {
    id: String,
}

/// GoTrue reports errors under a handful of different keys.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl SupabaseAuthClient {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: config.project_url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
            client,
        })
    }

    fn admin_users_url(&self) -> String {
        format!("{}/auth/v1/admin/users", self.base_url)
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("{} (HTTP {})", detail, status.as_u16())
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn create_user(&self, email: &str, password: &str) -> Result<String> {
        let request = CreateUserRequest {
            email,
            password,
            email_confirm: true,
        };

        let response = self
            .client
            .post(self.admin_users_url())
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MigrateError::identity(email, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::identity(email, error_message(status, &body)));
        }

        let user: CreatedUser = response
            .json()
            .await
            .map_err(|e| MigrateError::identity(email, format!("unexpected response: {}", e)))?;
        Ok(user.id)
    }
}
