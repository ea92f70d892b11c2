use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    admin::dto::{
        AdminAuthResponse, DeleteUserRequest, MessageResponse, UpdateUserRequest, UsersResponse,
    },
    auth::{
        jwt::{AdminUser, JwtKeys},
        password::{hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{LoginRequest, RegisterRequest, UserResponse},
        repo::User,
        services,
    },
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(admin_login))
        .route("/dataFetching", get(data_fetching))
        .route("/addUser", post(add_user))
        .route("/updateUser", put(update_user))
        .route("/deleteUser", delete(delete_user))
}

/// Like `login`, but a matched non-admin account is rejected with a
/// distinct error. The distinction is part of the admin contract even
/// though the user login path stays deliberately generic.
#[instrument(skip(state, payload))]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AdminAuthResponse>, ApiError> {
    payload.email = services::normalize_email(&payload.email);

    let admin = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "admin login unknown email");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !admin.is_admin {
        warn!(user_id = %admin.id, "admin login without admin flag");
        return Err(ApiError::AccessDenied);
    }

    if !verify_password(&payload.password, &admin.password_hash)? {
        warn!(user_id = %admin.id, "admin login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(admin.id)?;

    info!(user_id = %admin.id, "admin logged in");
    Ok(Json(AdminAuthResponse {
        message: "Admin Login successful".into(),
        token,
        admin: admin.into(),
    }))
}

#[instrument(skip(state, _admin))]
pub async fn data_fetching(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = User::list_all(&state.db).await?;
    Ok(Json(UsersResponse {
        data: users.into_iter().map(Into::into).collect(),
    }))
}

/// Registration performed by an admin on behalf of another person. Same
/// validation as the public path; the new account is never an admin and
/// no token is issued for it.
#[instrument(skip(state, admin, payload))]
pub async fn add_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.email = services::normalize_email(&payload.email);
    services::validate_new_user(&payload.name, &payload.email, &payload.password)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Duplicate("User already exists".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, payload.name.trim(), &payload.email, &hash).await?;

    info!(admin = %admin.id, user_id = %user.id, "admin created user");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User registered successfully".into(),
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let (name, email) =
        services::validate_profile_changes(&state, payload.id, payload.name, payload.email).await?;
    let user = User::update_data(&state.db, payload.id, name.as_deref(), email.as_deref()).await?;

    info!(admin = %admin.id, user_id = %user.id, "admin updated user");
    Ok(Json(UserResponse {
        message: "User updated successfully".into(),
        user: user.into(),
    }))
}

/// Hard delete. Tokens already issued for the account stay valid until
/// expiry; protected routes answer them with the forced-logout signal.
#[instrument(skip(state, admin, payload))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<DeleteUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    User::delete(&state.db, payload.id).await?;

    info!(admin = %admin.id, user_id = %payload.id, "admin deleted user");
    Ok(Json(MessageResponse {
        message: "User deleted successfully".into(),
    }))
}
