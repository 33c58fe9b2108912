//! User accounts: listing, registration, and plaintext-equality login
//! against the external document store.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use crate::store;

/// Stored user record, password included. Never serialized to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password: String,
    pub registered_at: String,
}

/// User shape exposed over the API (no password).
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

impl From<&UserRecord> for PublicUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: PublicUser,
}

async fn load_users(state: &AppState) -> Result<Vec<UserRecord>, StatusCode> {
    state.store.fetch_collection(store::USERS).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch users");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// GET /api/users: all registered accounts, passwords stripped.
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicUser>>, StatusCode> {
    let users = load_users(&state).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

/// POST /api/register: create an account. Usernames are unique in the
/// store; duplicates and empty fields are rejected.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut users = load_users(&state).await?;
    if users.iter().any(|u| u.username == body.username) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        username: body.username,
        password: body.password,
        registered_at: Utc::now().to_rfc3339(),
    };
    users.push(user.clone());

    state
        .store
        .replace_collection(store::USERS, &users)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store user");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tracing::info!(username = %user.username, "User account created");
    Ok(Json(AuthResponse {
        success: true,
        user: PublicUser::from(&user),
    }))
}

/// POST /api/login: plaintext credential equality.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let users = load_users(&state).await?;
    let user = users
        .iter()
        .find(|u| u.username == body.username && u.password == body.password)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(AuthResponse {
        success: true,
        user: PublicUser::from(user),
    }))
}
