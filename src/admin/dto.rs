use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::dto::PublicUser;

/// Response for a successful admin login.
#[derive(Debug, Serialize)]
pub struct AdminAuthResponse {
    pub message: String,
    pub token: String,
    pub admin: PublicUser,
}

/// Full user listing, passwords stripped by construction.
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub data: Vec<PublicUser>,
}

/// Admin edit of another account; name/email only.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
