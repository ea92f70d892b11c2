use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{AuthResponse, LoginRequest, RegisterRequest, UpdateDataRequest, UserResponse},
        repo::User,
        services,
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/update-data/:id", put(update_data))
        .route("/update-profile", post(update_profile))
        .layer(DefaultBodyLimit::max(services::MAX_UPLOAD_BYTES))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = services::normalize_email(&payload.email);
    services::validate_new_user(&payload.name, &payload.email, &payload.password)?;

    // Pre-check for a friendlier error; the unique constraint still backs
    // this up against races.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Duplicate("User already exists".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, payload.name.trim(), &payload.email, &hash).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".into(),
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = services::normalize_email(&payload.email);

    // Unknown email and wrong password fall through to the same error.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<UpdateDataRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if caller.id != id && !caller.is_admin {
        warn!(caller = %caller.id, target = %id, "profile update on foreign account");
        return Err(ApiError::Forbidden);
    }

    let (name, email) =
        services::validate_profile_changes(&state, id, payload.name, payload.email).await?;
    let user = User::update_data(&state.db, id, name.as_deref(), email.as_deref()).await?;

    info!(user_id = %user.id, "user data updated");
    Ok(Json(UserResponse {
        message: "User updated successfully".into(),
        user: user.into(),
    }))
}

#[instrument(skip(state, user, multipart))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Upload error: {e}")))?
    {
        if field.name() != Some("profileImage") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Validation("Image content type is required".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Upload error: {e}")))?;
        upload = Some((data, content_type));
    }

    let (body, content_type) =
        upload.ok_or_else(|| ApiError::Validation("please provide a profileImage file".into()))?;

    let user = services::upload_profile_image(&state, &user, body, &content_type).await?;

    info!(user_id = %user.id, "profile image updated");
    Ok(Json(UserResponse {
        message: "Profile image uploaded successfully".into(),
        user: user.into(),
    }))
}
