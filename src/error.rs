use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Errors surfaced by the HTTP boundary. Every handler failure is one of
/// these; anything unexpected is folded into `Internal` and the detail
/// stays in the server log.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Duplicate(String),

    /// Same payload for unknown email and wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(&'static str),

    /// Admin login only: the account exists but is not an admin.
    #[error("Access denied. Admin privileges required.")]
    AccessDenied,

    #[error("Access denied, admin privileges required")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Upload failed, storage unavailable")]
    Storage(#[source] anyhow::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Duplicate(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::Unauthorized(_)
            | ApiError::AccessDenied => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Storage(source) => {
                error!(error = %source, "storage upstream failed");
            }
            ApiError::Internal(source) => {
                error!(error = %source, "unhandled internal error");
            }
            _ => {}
        }
        let body = json!({ "message": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Tagged errors from the user store adapter, mapped into the public
/// taxonomy exactly once (below).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already exists")]
    DuplicateEmail,

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ApiError::Duplicate("Email already exists".into()),
            StoreError::UserNotFound => ApiError::NotFound("User not found"),
            StoreError::Database(e) => ApiError::Internal(anyhow::Error::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn rendered(err: ApiError) -> (StatusCode, String) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        // Both login failure paths construct the same variant; the rendered
        // payloads must match byte for byte.
        let (s1, b1) = rendered(ApiError::InvalidCredentials).await;
        let (s2, b2) = rendered(ApiError::InvalidCredentials).await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s1, s2);
        assert_eq!(b1, b2);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let (status, body) =
            rendered(ApiError::Internal(anyhow::anyhow!("connection refused to 10.0.0.7"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("10.0.0.7"));
        assert!(body.contains("Internal server error"));
    }

    #[tokio::test]
    async fn storage_errors_do_not_leak_detail() {
        let (status, body) =
            rendered(ApiError::Storage(anyhow::anyhow!("SignatureDoesNotMatch"))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body.contains("SignatureDoesNotMatch"));
    }

    #[test]
    fn store_errors_map_once_into_the_taxonomy() {
        assert!(matches!(
            ApiError::from(StoreError::DuplicateEmail),
            ApiError::Duplicate(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::UserNotFound),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::Database(sqlx::Error::PoolTimedOut)),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Duplicate("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::AccessDenied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("User missing").status(),
            StatusCode::NOT_FOUND
        );
    }
}
