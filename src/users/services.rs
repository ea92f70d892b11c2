use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState, users::repo::User};

pub(crate) const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shared validation for registration and the admin add-user path.
/// `is_admin` is never part of either payload.
pub(crate) fn validate_new_user(name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "please provide all required fields".into(),
        ));
    }
    if !is_valid_email(email) {
        return Err(ApiError::Validation("Invalid email format.".into()));
    }
    if password.len() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long.".into(),
        ));
    }
    Ok(())
}

/// Validates the supplied pieces of a partial profile update. Returns the
/// normalized (name, email) pair ready for the store.
pub(crate) async fn validate_profile_changes(
    state: &AppState,
    id: Uuid,
    name: Option<String>,
    email: Option<String>,
) -> Result<(Option<String>, Option<String>), ApiError> {
    let name = match name {
        Some(n) => {
            let n = n.trim().to_string();
            if n.is_empty() {
                return Err(ApiError::Validation("Name must not be empty".into()));
            }
            Some(n)
        }
        None => None,
    };

    let email = match email {
        Some(e) => {
            let e = normalize_email(&e);
            if !is_valid_email(&e) {
                return Err(ApiError::Validation("Invalid email format.".into()));
            }
            if User::email_taken_by_other(&state.db, &e, id).await? {
                return Err(ApiError::Duplicate("Email already exists".into()));
            }
            Some(e)
        }
        None => None,
    };

    Ok((name, email))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Stores the image bytes externally and persists the resulting URL.
/// The previous object is removed afterwards on a best-effort basis.
pub(crate) async fn upload_profile_image(
    state: &AppState,
    user: &User,
    body: Bytes,
    content_type: &str,
) -> Result<User, ApiError> {
    let ext = ext_from_mime(content_type)
        .ok_or_else(|| ApiError::Validation("Unsupported image type".into()))?;

    let key = format!("user_profiles/user-{}-{}.{}", user.id, Uuid::new_v4(), ext);
    state
        .storage
        .put_object(&key, body, content_type)
        .await
        .map_err(ApiError::Storage)?;

    let url = state.storage.object_url(&key);
    let updated = User::set_profile_image(&state.db, user.id, &url).await?;

    if let Some(old_key) = user
        .profile_image
        .as_deref()
        .and_then(|u| state.storage.key_from_url(u))
    {
        if let Err(e) = state.storage.delete_object(&old_key).await {
            warn!(error = %e, key = %old_key, "failed to delete previous profile image");
        }
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("ada@x.com"));
        assert!(is_valid_email("a.b+c@sub.domain.tld"));
        assert!(!is_valid_email("ada@x"));
        assert!(!is_valid_email("ada.x.com"));
        assert!(!is_valid_email("ada @x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize_email("  Ada@X.COM "), "ada@x.com");
    }

    #[test]
    fn new_user_validation_rejects_missing_fields() {
        let err = validate_new_user("", "ada@x.com", "secret1").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = validate_new_user("Ada", "", "secret1").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = validate_new_user("Ada", "ada@x.com", "").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn new_user_validation_rejects_bad_email_and_short_password() {
        assert!(matches!(
            validate_new_user("Ada", "not-an-email", "secret1"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_new_user("Ada", "ada@x.com", "12345"),
            Err(ApiError::Validation(_))
        ));
        assert!(validate_new_user("Ada", "ada@x.com", "secret1").is_ok());
    }

    #[test]
    fn mime_to_extension_covers_allowed_formats_only() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("image/svg+xml"), None);
    }
}
