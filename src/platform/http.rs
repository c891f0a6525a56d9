//! REST client for the chat platform's application command API.
//!
//! Wraps reqwest for the handful of calls the runtime needs: identity
//! check, guild listing, bulk command overwrite and interaction callbacks.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Interaction, Platform, Reply, TargetContext};
use crate::config::PlatformConfig;
use crate::error::{ConfigurationError, PlatformError};

/// Interaction callback type for "respond with a message".
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
/// Message flag hiding the reply from everyone but the invoker.
const EPHEMERAL_FLAG: u64 = 1 << 6;

#[derive(Debug, Deserialize)]
struct PartialGuild {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PartialApplication {
    id: String,
}

/// Platform implementation over HTTPS.
///
/// The credential is not part of construction; it is supplied with
/// [`HttpPlatform::set_token`] before the first network call.
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    application_id: RwLock<Option<String>>,
}

impl HttpPlatform {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("slashsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            application_id: RwLock::new(config.application_id.clone()),
        })
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, PlatformError> {
        let token = self
            .token
            .read()
            .clone()
            .ok_or(PlatformError::MissingCredential)?;
        Ok(self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {token}")))
    }

    async fn send_json(&self, builder: RequestBuilder) -> Result<Value, PlatformError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn application_id(&self) -> Result<String, PlatformError> {
        if let Some(id) = self.application_id.read().clone() {
            return Ok(id);
        }

        let value = self
            .send_json(self.request(Method::GET, "/oauth2/applications/@me")?)
            .await?;
        let app: PartialApplication =
            serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))?;

        debug!("discovered application id {}", app.id);
        *self.application_id.write() = Some(app.id.clone());
        Ok(app.id)
    }

    fn commands_path(app: &str, target: &TargetContext) -> String {
        format!("/applications/{app}/guilds/{}/commands", target.id)
    }
}

/// Map a failed identity check to a human-readable startup error.
fn classify(error: &PlatformError) -> ConfigurationError {
    match error {
        PlatformError::MissingCredential => ConfigurationError::InvalidToken,
        PlatformError::Status { status: 401, .. } => ConfigurationError::InvalidToken,
        PlatformError::Status { status, .. } => ConfigurationError::Other(status.to_string()),
        PlatformError::Http(e) if e.is_connect() || e.is_timeout() => {
            if caused_by_reset(e) {
                ConfigurationError::ConnectionReset
            } else {
                ConfigurationError::Unreachable
            }
        }
        PlatformError::Http(e) if caused_by_reset(e) => ConfigurationError::ConnectionReset,
        other => ConfigurationError::Other(other.to_string()),
    }
}

fn caused_by_reset(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        current = err.source();
    }
    false
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn verify(&self) -> Result<(), ConfigurationError> {
        let request = self
            .request(Method::GET, "/users/@me")
            .map_err(|e| classify(&e))?;
        self.send_json(request).await.map_err(|e| {
            warn!("identity check failed: {e}");
            classify(&e)
        })?;
        self.application_id().await.map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn targets(&self) -> Result<Vec<TargetContext>, PlatformError> {
        let value = self
            .send_json(self.request(Method::GET, "/users/@me/guilds")?)
            .await?;
        let guilds: Vec<PartialGuild> =
            serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))?;
        Ok(guilds
            .into_iter()
            .map(|g| TargetContext::new(g.id, g.name))
            .collect())
    }

    async fn fetch_commands(&self, target: &TargetContext) -> Result<Vec<Value>, PlatformError> {
        let app = self.application_id().await?;
        let value = self
            .send_json(self.request(Method::GET, &Self::commands_path(&app, target))?)
            .await?;
        match value {
            Value::Array(commands) => Ok(commands),
            other => Err(PlatformError::Decode(format!(
                "expected a command list, got {other}"
            ))),
        }
    }

    async fn set_commands(
        &self,
        target: &TargetContext,
        commands: Vec<Value>,
    ) -> Result<(), PlatformError> {
        let app = self.application_id().await?;
        debug!("PUT {} commands to {}", commands.len(), target.id);
        let request = self
            .request(Method::PUT, &Self::commands_path(&app, target))?
            .json(&commands);
        self.send_json(request).await?;
        Ok(())
    }

    async fn respond(&self, interaction: &Interaction, reply: Reply) -> Result<(), PlatformError> {
        let mut data = json!({ "content": reply.content });
        if reply.ephemeral {
            data["flags"] = json!(EPHEMERAL_FLAG);
        }
        let body = json!({ "type": CHANNEL_MESSAGE_WITH_SOURCE, "data": data });

        // Callbacks are authenticated by the interaction token, not the bot token.
        let request = self
            .client
            .post(format!(
                "{}/interactions/{}/{}/callback",
                self.base_url, interaction.id, interaction.token
            ))
            .json(&body);
        self.send_json(request).await?;
        Ok(())
    }
}
