//! Login, token refresh and bearer resolution.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{PasswordHasher, SessionTokens, TokenKind};
use crate::models::user::{AccessToken, Actor, LoginRequest, RefreshRequest, TokenPair, User, UserFilter};
use crate::store::UserStore;
use crate::utils::error::{AppError, ErrorCode};
use crate::utils::validation::{FieldError, ValidationCode, Validator};

#[derive(Clone)]
pub struct CredentialService {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<SessionTokens>,
}

/// Runs the digest capability on the blocking pool.
pub(crate) async fn hash_password(
    hasher: &Arc<dyn PasswordHasher>,
    password: String,
) -> Result<String, AppError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| AppError::InternalServerError(format!("hashing task failed: {e}")))?
}

async fn verify_password(
    hasher: &Arc<dyn PasswordHasher>,
    digest: String,
    password: String,
) -> Result<bool, AppError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.verify(&digest, &password))
        .await
        .map_err(|e| AppError::InternalServerError(format!("verification task failed: {e}")))
}

impl CredentialService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<SessionTokens>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }

    pub async fn authenticate(&self, request: LoginRequest) -> Result<TokenPair, AppError> {
        let mut v = Validator::new();
        let email = v.required("email", request.email.as_deref());
        let password = match request.password {
            Some(p) if !p.is_empty() => Some(p),
            _ => {
                v.push("password", ValidationCode::RequiredField);
                None
            }
        };
        v.finish()?;
        let (Some(email), Some(password)) = (email, password) else {
            return Err(AppError::business(ErrorCode::InvalidCredentials));
        };

        let filter = UserFilter {
            email: Some(email.to_ascii_lowercase()),
            ..UserFilter::default()
        };
        let Some(user) = self.users.select_one_by_filter(&filter).await? else {
            warn!("Login attempt for unknown email");
            return Err(AppError::business(ErrorCode::InvalidCredentials));
        };

        if !verify_password(&self.hasher, user.password.clone(), password).await? {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(AppError::business(ErrorCode::InvalidCredentials));
        }

        info!(user_id = %user.id, "User authenticated");
        Ok(self.tokens.issue_pair(user.id).await)
    }

    pub async fn refresh(&self, request: RefreshRequest) -> Result<AccessToken, AppError> {
        let token = request
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation(vec![FieldError::new(
                    "refreshToken",
                    ValidationCode::InvalidToken,
                )])
            })?;

        let user = self.live_user(&token, TokenKind::Refresh).await?;
        Ok(AccessToken {
            access_token: self.tokens.issue_access(user.id).await,
        })
    }

    pub async fn logout(&self, request: RefreshRequest) {
        if let Some(token) = request.refresh_token {
            self.tokens.revoke(&token).await;
        }
    }

    /// The actor an access token belongs to.
    pub async fn resolve(&self, access_token: &str) -> Result<Actor, AppError> {
        let user = self.live_user(access_token, TokenKind::Access).await?;
        Ok(Actor::from(&user))
    }

    async fn live_user(&self, token: &str, kind: TokenKind) -> Result<User, AppError> {
        let user_id = self
            .tokens
            .validate(token, kind)
            .await
            .ok_or_else(|| AppError::AuthError("Invalid or expired token".to_string()))?;
        self.users
            .select_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid or expired token".to_string()))
    }
}
