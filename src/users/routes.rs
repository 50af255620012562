use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::models::{NewUser, User};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CreateUserRequest {
    /// Both fields must be present and non-blank.
    fn validate(self) -> Option<NewUser> {
        let name = self.name?.trim().to_string();
        let email = self.email?.trim().to_string();
        if name.is_empty() || email.is_empty() {
            return None;
        }
        Some(NewUser { name, email })
    }
}

/// POST /api/users — Create a user from `{name, email}`.
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let new_user = body
        .ok()
        .and_then(|Json(req)| req.validate())
        .ok_or_else(|| ApiError::bad_request("Name and email are required"))?;

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || repo::create_user(&db, &new_user)).await??;

    tracing::info!(user_id = user.id, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users — List all users.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let db = state.db.clone();
    let users = tokio::task::spawn_blocking(move || repo::list_users(&db)).await??;
    Ok(Json(users))
}
