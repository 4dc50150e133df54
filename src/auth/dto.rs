use serde::{Deserialize, Serialize};

use crate::auth::repo::User;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub roles: Vec<String>,
}

impl PublicUser {
    pub fn from_user(user: User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            surname: user.surname,
            roles,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}
