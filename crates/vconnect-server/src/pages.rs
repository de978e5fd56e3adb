//! HTML routes: landing form, join redirect and the room page shell.

use axum::extract::{Path, Query};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LANDING: &str = "/";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomIdResponse {
    pub room_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    pub username: Option<String>,
    pub room_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomParams {
    pub username: Option<String>,
}

/// Eight hex characters from a fresh v4 UUID.
pub fn new_room_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Target of a join: `/room/{room}?username={username}`, or the landing
/// page if either is missing.
pub fn join_location(params: &JoinParams) -> String {
    match (non_blank(params.username.as_ref()), non_blank(params.room_name.as_ref())) {
        (Some(username), Some(room)) => format!(
            "/room/{}?username={}",
            urlencoding::encode(room),
            urlencoding::encode(username)
        ),
        _ => LANDING.to_string(),
    }
}

/// `GET /`
pub async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// `GET /api/room-id`
pub async fn room_id() -> Json<RoomIdResponse> {
    Json(RoomIdResponse {
        room_id: new_room_id(),
    })
}

/// `GET /join`
pub async fn join(Query(params): Query<JoinParams>) -> Redirect {
    Redirect::to(&join_location(&params))
}

/// `GET /room/:room_id`
pub async fn room(Path(room_id): Path<String>, Query(params): Query<RoomParams>) -> Response {
    let Some(username) = non_blank(params.username.as_ref()) else {
        tracing::debug!("room {room_id} requested without username");
        return Redirect::to(LANDING).into_response();
    };
    tracing::info!("serving room {room_id} for {username}");
    Html(render_room(&room_id, username)).into_response()
}

pub fn render_room(room_id: &str, username: &str) -> String {
    ROOM_PAGE
        .replace("{room_id}", &escape_html(room_id))
        .replace("{username}", &escape_html(username))
}

const LANDING_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Video Connect</title>
</head>
<body>
<main>
<h1>Video Connect</h1>
<p>Connect with anyone, anywhere, anytime</p>
<form action="/join" method="get">
<label for="username">Your Name</label>
<input type="text" id="username" name="username" placeholder="Enter your name" required>
<label for="roomName">Room ID</label>
<input type="text" id="roomName" name="roomName" placeholder="Enter room ID" required>
<button type="button" id="generate">Generate Room ID</button>
<button type="submit">Join Room</button>
</form>
<p>Start a video call by entering your name and creating or joining a room</p>
</main>
<script>
document.getElementById("generate").addEventListener("click", async () => {
  const res = await fetch("/api/room-id");
  const body = await res.json();
  document.getElementById("roomName").value = body.roomId;
});
</script>
</body>
</html>
"#;

const ROOM_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Room {room_id}</title>
</head>
<body>
<main id="room" data-room-id="{room_id}" data-username="{username}">
<h1>Room: {room_id}</h1>
<p>Joining as {username}</p>
<div id="participants"></div>
<div id="controls"></div>
</main>
</body>
</html>
"#;
