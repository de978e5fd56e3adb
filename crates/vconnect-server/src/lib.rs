//! HTTP front-end of vconnect: token issuance for the video platform and
//! the pages that lead a user into a room.
//!
//! - `POST /api/token` - access token for `{identity, roomName}`
//! - `GET /api/room-id` - fresh room id
//! - `GET /` - landing form
//! - `GET /join` - redirect into a room
//! - `GET /room/:room_id` - room page

pub mod config;
pub mod error;
pub mod pages;
pub mod token;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{CredentialSource, Credentials, EnvCredentials, ServerConfig, StaticCredentials};
pub use error::{ApiError, ServerError};
pub use token::{TokenIssuer, TokenRequest, TokenResponse};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(issuer: TokenIssuer) -> Self {
        Self {
            issuer: Arc::new(issuer),
        }
    }
}

/// Build the router. CORS applies to `/api/*` only.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api = Router::new()
        .route("/api/token", post(token::issue_token))
        .route("/api/room-id", get(pages::room_id))
        .layer(cors);

    Router::new()
        .route("/", get(pages::landing))
        .route("/join", get(pages::join))
        .route("/room/:room_id", get(pages::room))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
