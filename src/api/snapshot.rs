//! Read-only views of the hub's current state.

use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;

use crate::{
    directory::Participant,
    events::{ChatEvent, ReelPost, StatusPost},
    AppError, AppResult, Hub,
};

#[derive(Serialize)]
pub(crate) struct UsersSnapshot {
    users: Vec<Participant>,
    count: usize,
}

#[derive(Serialize)]
pub(crate) struct MessagesSnapshot {
    messages: Vec<ChatEvent>,
    count: usize,
}

#[derive(Serialize)]
pub(crate) struct StatusesSnapshot {
    statuses: Vec<StatusPost>,
    count: usize,
}

#[derive(Serialize)]
pub(crate) struct ReelsSnapshot {
    reels: Vec<ReelPost>,
    count: usize,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn users(State(hub): State<Arc<Hub>>) -> Json<UsersSnapshot> {
    let users = hub.users().await;
    Json(UsersSnapshot {
        count: users.len(),
        users,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn user(
    Path(id): Path<String>,
    State(hub): State<Arc<Hub>>,
) -> AppResult<Json<Participant>> {
    hub.user(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("user {id}")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn messages(State(hub): State<Arc<Hub>>) -> Json<MessagesSnapshot> {
    let messages = hub.messages().await;
    Json(MessagesSnapshot {
        count: messages.len(),
        messages,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn statuses(State(hub): State<Arc<Hub>>) -> Json<StatusesSnapshot> {
    let statuses = hub.statuses().await;
    Json(StatusesSnapshot {
        count: statuses.len(),
        statuses,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn reels(State(hub): State<Arc<Hub>>) -> Json<ReelsSnapshot> {
    let reels = hub.reels().await;
    Json(ReelsSnapshot {
        count: reels.len(),
        reels,
    })
}
