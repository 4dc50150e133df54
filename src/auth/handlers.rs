use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::auth::dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest};
use crate::auth::jwt::{AuthUser, JwtKeys};
use crate::auth::password::{hash_password, is_valid_email, verify_password};
use crate::auth::repo::User;
use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_ROLE: &str = "user";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn token_pair(
    keys: &JwtKeys,
    user: User,
    roles: Vec<String>,
) -> Result<AuthResponse, AppError> {
    let access_token = keys.sign_access(user.id, &roles)?;
    let refresh_token = keys.sign_refresh(user.id, &roles)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from_user(user, roles),
    })
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("Password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &payload.email,
        &payload.name,
        &payload.surname,
        &hash,
    )
    .await?;
    User::assign_role(&state.db, user.id, DEFAULT_ROLE).await?;

    let keys = JwtKeys::from_ref(&state);
    let response = token_pair(&keys, user, vec![DEFAULT_ROLE.to_string()])?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };
    if !user.is_active {
        warn!(user_id = user.id, "login attempt on inactive account");
        return Err(AppError::Forbidden("Account is deactivated".into()));
    }
    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let roles = User::roles(&state.db, user.id).await?;
    let keys = JwtKeys::from_ref(&state);
    let response = token_pair(&keys, user, roles)?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    let Some(user) = User::find_by_id(&state.db, claims.sub).await? else {
        return Err(AppError::Unauthorized("User no longer exists".into()));
    };
    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".into()));
    }

    // Roles are reloaded so a revoked role does not outlive the old token.
    let roles = User::roles(&state.db, user.id).await?;
    let response = token_pair(&keys, user, roles)?;
    Ok(Json(response))
}

#[instrument(skip(state))]
async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let Some(user) = User::find_by_id(&state.db, user_id).await? else {
        return Err(AppError::NotFound("User"));
    };
    let roles = User::roles(&state.db, user_id).await?;
    Ok(Json(PublicUser::from_user(user, roles)))
}
