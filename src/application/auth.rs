use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{RepoError, UserSessionsRepo};
use crate::domain::users::Principal;

const TOKEN_PREFIX: &str = "ts";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid session token")]
    Invalid,
    #[error("expired session token")]
    Expired,
    #[error("revoked session token")]
    Revoked,
    #[error("session lookup failed: {0}")]
    Unavailable(#[source] RepoError),
}

/// A freshly minted token and the values to persist for it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
}

/// Resolves bearer tokens of the form `ts_<prefix>_<secret>` to a [`Principal`].
#[derive(Clone)]
pub struct SessionAuthService {
    repo: Arc<dyn UserSessionsRepo>,
}

impl SessionAuthService {
    pub fn new(repo: Arc<dyn UserSessionsRepo>) -> Self {
        Self { repo }
    }

    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let parsed = parse_token(token).ok_or(AuthError::Invalid)?;
        let record = self
            .repo
            .find_by_prefix(&parsed.prefix)
            .await
            .map_err(AuthError::Unavailable)?
            .ok_or(AuthError::Invalid)?;

        let now = OffsetDateTime::now_utc();
        if let Some(revoked_at) = record.revoked_at
            && revoked_at <= now
        {
            return Err(AuthError::Revoked);
        }
        if record.expires_at <= now {
            return Err(AuthError::Expired);
        }

        let hashed_input = hash_token_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }

        // best-effort last_seen update; do not block auth
        let repo = self.repo.clone();
        let session_id = record.id;
        tokio::spawn(async move {
            if let Err(err) = repo.update_last_seen(session_id, now).await {
                debug!(
                    target = "ledgerdesk::auth",
                    session_id = %session_id,
                    error = %err,
                    "failed to record session activity"
                );
            }
        });

        Ok(record.principal())
    }
}

/// Mint a new token. The login flow stores `prefix` and `hashed_secret`.
pub fn issue_token() -> IssuedToken {
    let prefix = Uuid::new_v4().simple().to_string()[..12].to_string();
    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    IssuedToken {
        token: format!("{TOKEN_PREFIX}_{prefix}_{secret}"),
        hashed_secret: hash_token_secret(&secret),
        prefix,
    }
}

pub fn hash_token_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}
