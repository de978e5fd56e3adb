use serde::{Deserialize, Serialize};

use crate::errors::SessionError;
use crate::platform::JoinGrant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    identity: &'a str,
    room_name: &'a str,
}

/// Body of `/api/token` responses, success or failure.
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Token and connection info returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// WebSocket URL of the video platform (may be empty if the server
    /// does not report one).
    pub url: String,
    /// JWT access token
    pub token: String,
}

impl TokenInfo {
    pub fn into_grant(self, room_name: &str) -> JoinGrant {
        JoinGrant {
            url: self.url,
            token: self.token,
            room_name: room_name.to_string(),
        }
    }
}

/// Fetches access tokens from the server's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    base_url: String,
    http: reqwest::Client,
}

impl TokenClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/token", self.base_url)
    }

    /// Request a token granting `identity` access to `room_name`.
    pub async fn request_token(
        &self,
        identity: &str,
        room_name: &str,
    ) -> Result<TokenInfo, SessionError> {
        let url = self.endpoint();
        tracing::info!("requesting token for {identity} in room {room_name}");

        let resp = self
            .http
            .post(&url)
            .json(&TokenRequest {
                identity,
                room_name,
            })
            .send()
            .await
            .map_err(|e| SessionError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SessionError::Http(e.to_string()))?;

        let info = parse_token_response(status.is_success(), &body)?;
        tracing::info!("token received");
        Ok(info)
    }
}

fn parse_token_response(success: bool, body: &str) -> Result<TokenInfo, SessionError> {
    let data: TokenResponse = match serde_json::from_str(body) {
        Ok(data) => data,
        Err(e) if success => {
            return Err(SessionError::Auth(format!("invalid token response: {e}")));
        }
        Err(_) => TokenResponse::default(),
    };

    if !success {
        return Err(SessionError::Auth(
            data.error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Failed to fetch token".to_string()),
        ));
    }

    match data.token {
        Some(token) if !token.is_empty() => Ok(TokenInfo {
            url: data.url.unwrap_or_default(),
            token,
        }),
        _ => Err(SessionError::Auth("No token received from server".to_string())),
    }
}
