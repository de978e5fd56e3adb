use std::sync::Arc;

use crate::auth::{TokenClient, TokenInfo};
use crate::errors::SessionError;
use crate::platform::MediaPlatform;
use crate::session::{LeaveHandler, SessionController};

pub const LANDING_PATH: &str = "/";

/// What the room page shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Loading,
    /// Navigate elsewhere instead of rendering.
    Redirect(String),
    Error(String),
    Ready(TokenInfo),
}

/// Client-side flow behind `/room/{room_id}?username=...`: fetch a token,
/// then own at most one session at a time.
pub struct RoomPage<P: MediaPlatform> {
    room_id: String,
    username: Option<String>,
    client: TokenClient,
    state: PageState,
    session: Option<Arc<SessionController<P>>>,
}

impl<P: MediaPlatform> RoomPage<P> {
    pub fn new(client: TokenClient, room_id: impl Into<String>, username: Option<String>) -> Self {
        Self {
            room_id: room_id.into(),
            username: username.filter(|u| !u.trim().is_empty()),
            client,
            state: PageState::Loading,
            session: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn session(&self) -> Option<&Arc<SessionController<P>>> {
        self.session.as_ref()
    }

    /// Resolve the page: redirect without a username, otherwise fetch a token.
    pub async fn load(&mut self) -> &PageState {
        let Some(username) = self.username.as_deref() else {
            tracing::info!("no username for room {}, redirecting", self.room_id);
            self.state = PageState::Redirect(LANDING_PATH.to_string());
            return &self.state;
        };

        self.state = PageState::Loading;
        self.state = match self.client.request_token(username, &self.room_id).await {
            Ok(info) => PageState::Ready(info),
            Err(e) => {
                tracing::error!("error fetching token: {e}");
                PageState::Error(format!("Connection error: {}", error_message(&e)))
            }
        };
        &self.state
    }

    /// Create and start the session for a loaded page.
    ///
    /// Refused while a previous session still holds local media.
    pub async fn join(
        &mut self,
        platform: P,
        on_leave: LeaveHandler,
    ) -> Result<Arc<SessionController<P>>, SessionError> {
        let PageState::Ready(info) = &self.state else {
            return Err(SessionError::Auth("no token loaded".to_string()));
        };

        if let Some(existing) = &self.session {
            if !existing.phase().await.is_finished() {
                return Err(SessionError::SessionActive);
            }
        }

        let grant = info.clone().into_grant(&self.room_id);
        let session = Arc::new(SessionController::new(platform, grant).on_leave(on_leave));
        self.session = Some(session.clone());
        session.start().await?;
        Ok(session)
    }

    /// Tear the current session down without navigating.
    pub async fn unmount(&mut self) -> Result<(), SessionError> {
        match self.session.take() {
            Some(session) => session.unmount().await,
            None => Ok(()),
        }
    }
}

fn error_message(err: &SessionError) -> String {
    match err {
        SessionError::Auth(msg) | SessionError::Http(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionPhase;
    use crate::testing::FakePlatform;

    fn ready_page() -> RoomPage<FakePlatform> {
        let mut page = RoomPage::new(
            TokenClient::new("http://127.0.0.1:9"),
            "8f3c1a9d",
            Some("alice".to_string()),
        );
        page.state = PageState::Ready(TokenInfo {
            url: "wss://video.example.test".to_string(),
            token: "t".to_string(),
        });
        page
    }

    fn no_op() -> LeaveHandler {
        Arc::new(|| {})
    }

    #[tokio::test]
    async fn missing_username_redirects_to_landing() {
        for username in [None, Some(String::new()), Some("  ".to_string())] {
            let mut page =
                RoomPage::<FakePlatform>::new(TokenClient::new("http://127.0.0.1:9"), "r", username);
            assert_eq!(page.load().await, &PageState::Redirect("/".to_string()));
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let mut page = RoomPage::<FakePlatform>::new(
            TokenClient::new("http://127.0.0.1:9"),
            "r",
            Some("alice".to_string()),
        );
        match page.load().await {
            PageState::Error(msg) => assert!(msg.starts_with("Connection error: ")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_session_at_a_time() {
        let mut page = ready_page();
        let platform = FakePlatform::new();

        let first = page.join(platform.clone(), no_op()).await.unwrap();
        assert_eq!(
            page.join(platform.clone(), no_op()).await.err(),
            Some(SessionError::SessionActive)
        );

        first.leave().await.unwrap();
        assert!(platform.acquired().iter().all(|t| !t.is_live()));

        let second = page.join(platform.clone(), no_op()).await.unwrap();
        assert_eq!(second.phase().await, SessionPhase::Connected);
        assert_eq!(platform.acquired().len(), 4);

        page.unmount().await.unwrap();
        assert!(platform.acquired().iter().all(|t| t.stop_calls() == 1));
    }

    #[tokio::test]
    async fn join_requires_token() {
        let mut page = RoomPage::<FakePlatform>::new(
            TokenClient::new("http://127.0.0.1:9"),
            "r",
            Some("alice".to_string()),
        );
        assert!(page.join(FakePlatform::new(), no_op()).await.is_err());
    }
}
