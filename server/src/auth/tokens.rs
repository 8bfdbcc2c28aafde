//! Opaque session tokens.
//!
//! A token is `<id>.<secret>`, both halves random and base64url encoded. Only
//! the SHA-256 digest of the secret is retained, and lookups compare digests
//! in constant time.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::user::TokenPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone)]
struct Session {
    user_id: Uuid,
    kind: TokenKind,
    digest: [u8; 32],
    expires_at: DateTime<Utc>,
}

pub struct SessionTokens {
    access_ttl: Duration,
    refresh_ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

fn random_part(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl SessionTokens {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_ttl,
            refresh_ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn issue(&self, user_id: Uuid, kind: TokenKind) -> String {
        let id = random_part(16);
        let secret = random_part(32);
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let session = Session {
            user_id,
            kind,
            digest: digest(&secret),
            expires_at: expiry(ttl),
        };

        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(id.clone(), session);

        format!("{id}.{secret}")
    }

    pub async fn issue_pair(&self, user_id: Uuid) -> TokenPair {
        TokenPair {
            access_token: self.issue(user_id, TokenKind::Access).await,
            refresh_token: self.issue(user_id, TokenKind::Refresh).await,
        }
    }

    pub async fn issue_access(&self, user_id: Uuid) -> String {
        self.issue(user_id, TokenKind::Access).await
    }

    /// Owner of a live token of the given kind.
    pub async fn validate(&self, token: &str, kind: TokenKind) -> Option<Uuid> {
        let (id, secret) = token.trim().split_once('.')?;
        let sessions = self.sessions.read().await;
        let session = sessions.get(id)?;

        let matches = constant_time_eq::constant_time_eq(&session.digest, &digest(secret));
        (matches && session.kind == kind && session.expires_at > Utc::now())
            .then_some(session.user_id)
    }

    pub async fn revoke(&self, token: &str) {
        let Some((id, secret)) = token.trim().split_once('.') else {
            return;
        };
        let mut sessions = self.sessions.write().await;
        let owned = sessions
            .get(id)
            .is_some_and(|s| constant_time_eq::constant_time_eq(&s.digest, &digest(secret)));
        if owned {
            sessions.remove(id);
        }
    }

    pub async fn revoke_user(&self, user_id: Uuid) {
        self.sessions
            .write()
            .await
            .retain(|_, s| s.user_id != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> SessionTokens {
        SessionTokens::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_tokens_resolve_only_as_their_kind() {
        let tokens = tokens();
        let user = Uuid::new_v4();
        let pair = tokens.issue_pair(user).await;

        assert_eq!(tokens.validate(&pair.access_token, TokenKind::Access).await, Some(user));
        assert_eq!(tokens.validate(&pair.refresh_token, TokenKind::Refresh).await, Some(user));
        assert_eq!(tokens.validate(&pair.access_token, TokenKind::Refresh).await, None);
    }

    #[tokio::test]
    async fn test_tampered_secret_is_rejected() {
        let tokens = tokens();
        let access = tokens.issue_access(Uuid::new_v4()).await;
        let (id, _) = access.split_once('.').unwrap();

        assert_eq!(tokens.validate(&format!("{id}.forged"), TokenKind::Access).await, None);
        assert_eq!(tokens.validate("garbage", TokenKind::Access).await, None);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let tokens = SessionTokens::new(Duration::ZERO, Duration::ZERO);
        let access = tokens.issue_access(Uuid::new_v4()).await;
        assert_eq!(tokens.validate(&access, TokenKind::Access).await, None);
    }

    #[tokio::test]
    async fn test_revoke_and_revoke_user() {
        let tokens = tokens();
        let user = Uuid::new_v4();
        let first = tokens.issue_pair(user).await;
        let second = tokens.issue_pair(user).await;

        tokens.revoke(&first.refresh_token).await;
        assert_eq!(tokens.validate(&first.refresh_token, TokenKind::Refresh).await, None);
        assert!(tokens.validate(&second.refresh_token, TokenKind::Refresh).await.is_some());

        tokens.revoke_user(user).await;
        assert_eq!(tokens.validate(&second.access_token, TokenKind::Access).await, None);
    }
}
