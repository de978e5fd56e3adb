use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use livekit_api::access_token::{AccessToken, VideoGrants};
use serde::{Deserialize, Serialize};

use crate::config::{CredentialSource, Credentials};
use crate::error::ApiError;
use crate::AppState;

const REQUIRED_FIELDS: &str = "Identity and room name are required";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl TokenRequest {
    fn validated(&self) -> Result<(&str, &str), ApiError> {
        match (present(&self.identity), present(&self.room_name)) {
            (Some(identity), Some(room)) => Ok((identity, room)),
            _ => Err(ApiError::Validation(REQUIRED_FIELDS.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Platform WebSocket URL the client should connect to.
    pub url: String,
}

/// Signs room-scoped access tokens.
pub struct TokenIssuer {
    credentials: Arc<dyn CredentialSource>,
    ttl: Option<Duration>,
}

impl TokenIssuer {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            credentials,
            ttl: None,
        }
    }

    /// Override the platform's default token lifetime.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a token for `request`; `None` stands for a body that could not
    /// be parsed. Credentials are checked before the request is looked at.
    pub fn issue(&self, request: Option<&TokenRequest>) -> Result<TokenResponse, ApiError> {
        let credentials = self.credentials.credentials().ok_or_else(|| {
            tracing::error!("missing platform credentials in environment");
            ApiError::Config("Missing credentials".to_string())
        })?;
        let url = credentials.client_url()?;

        let (identity, room_name) = request
            .ok_or_else(|| ApiError::Validation(REQUIRED_FIELDS.to_string()))?
            .validated()?;

        tracing::info!("generating token for identity: {identity}, room: {room_name}");
        let token = self.sign(&credentials, identity, room_name)?;
        tracing::debug!("token generated");
        Ok(TokenResponse { token, url })
    }

    fn sign(
        &self,
        credentials: &Credentials,
        identity: &str,
        room_name: &str,
    ) -> Result<String, ApiError> {
        let mut token = AccessToken::with_api_key(&credentials.api_key, &credentials.api_secret)
            .with_identity(identity)
            .with_name(identity)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                ..Default::default()
            });
        if let Some(ttl) = self.ttl {
            token = token.with_ttl(ttl);
        }
        token.to_jwt().map_err(|e| ApiError::Signing(e.to_string()))
    }
}

/// `POST /api/token`
pub async fn issue_token(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = match &body {
        Ok(Json(request)) => Some(request),
        Err(rejection) => {
            tracing::debug!("unreadable token request: {rejection}");
            None
        }
    };
    state.issuer.issue(request).map(Json)
}
