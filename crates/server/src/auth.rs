//! Owner authentication and request tracing middleware.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{AUTH_FAILURES, OWNERS_RESERVED};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use calsnap_core::{OwnerName, PassphraseHash};
use calsnap_metadata::models::OwnerRow;
use calsnap_metadata::{MetadataError, MetadataStore};
use calsnap_metadata::repos::OwnerRepo;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying a client-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longer request ids are truncated.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, keeping printable ASCII only.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic())
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attach a trace id to every request and run the handler inside a span carrying it.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default();
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// Owner name and passphrase hash taken from a request.
pub struct Credentials {
    pub owner_name: OwnerName,
    pub passphrase_hash: PassphraseHash,
}

impl Credentials {
    /// Build credentials from optional query values. Anything missing or
    /// malformed is `Unauthorized`.
    pub fn from_parts(owner_name: Option<&str>, passphrase_hash: Option<&str>) -> ApiResult<Self> {
        let (Some(owner_name), Some(passphrase_hash)) = (owner_name, passphrase_hash) else {
            AUTH_FAILURES.inc();
            return Err(ApiError::Unauthorized);
        };
        let parsed = OwnerName::parse(owner_name)
            .and_then(|name| PassphraseHash::parse(passphrase_hash).map(|hash| (name, hash)));
        match parsed {
            Ok((owner_name, passphrase_hash)) => Ok(Self {
                owner_name,
                passphrase_hash,
            }),
            Err(_) => {
                AUTH_FAILURES.inc();
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// Validates owners, provisioning them on first reservation.
pub struct OwnerAuthenticator {
    metadata: Arc<dyn MetadataStore>,
    /// Serializes the check-then-create sequence of `reserve_or_authenticate`.
    reserve_lock: Mutex<()>,
}

impl OwnerAuthenticator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            metadata,
            reserve_lock: Mutex::new(()),
        }
    }

    /// Create the owner if the name is unused (first writer wins), otherwise
    /// require a matching hash.
    pub async fn reserve_or_authenticate(&self, credentials: &Credentials) -> ApiResult<OwnerRow> {
        let name = credentials.owner_name.as_str();
        let now = OffsetDateTime::now_utc();

        let owner = {
            let _guard = self.reserve_lock.lock().await;
            match self.metadata.get_owner_by_name(name).await? {
                Some(owner) => owner,
                None => {
                    let reservation = self
                        .metadata
                        .reserve_owner(name, credentials.passphrase_hash.expose(), now)
                        .await?;
                    if reservation.created {
                        OWNERS_RESERVED.inc();
                        tracing::info!(owner_id = %reservation.owner.owner_id, "Owner reserved");
                    }
                    reservation.owner
                }
            }
        };

        self.verify_and_touch(owner, credentials, now).await
    }

    /// Succeed iff an owner with this name and hash exists. A missing owner
    /// and a wrong hash are indistinguishable to the caller.
    pub async fn authenticate(&self, credentials: &Credentials) -> ApiResult<OwnerRow> {
        let now = OffsetDateTime::now_utc();
        let Some(owner) = self
            .metadata
            .get_owner_by_name(credentials.owner_name.as_str())
            .await?
        else {
            AUTH_FAILURES.inc();
            tracing::debug!("Authentication failed: unknown owner");
            return Err(ApiError::Unauthorized);
        };

        self.verify_and_touch(owner, credentials, now).await
    }

    async fn verify_and_touch(
        &self,
        mut owner: OwnerRow,
        credentials: &Credentials,
        now: OffsetDateTime,
    ) -> ApiResult<OwnerRow> {
        if !credentials.passphrase_hash.matches(&owner.passphrase_hash) {
            AUTH_FAILURES.inc();
            tracing::debug!(owner_id = %owner.owner_id, "Authentication failed: hash mismatch");
            return Err(ApiError::Unauthorized);
        }

        match self.metadata.touch_owner(owner.owner_id, now).await {
            Ok(()) => {}
            // Removed by retention between lookup and touch.
            Err(MetadataError::NotFound(_)) => {
                AUTH_FAILURES.inc();
                tracing::debug!(owner_id = %owner.owner_id, "Authentication failed: owner removed");
                return Err(ApiError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        }
        owner.last_seen_at = now;
        Ok(owner)
    }
}
