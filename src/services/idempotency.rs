//! Request deduplication keyed by client-supplied idempotency tokens.
//!
//! First successful processing of a key stores a fingerprint (request hash
//! plus response snapshot); every later request with the same key either
//! replays the snapshot or, when the payload differs, fails with a 409.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::ports::{FingerprintStore, IdempotencyFingerprint, StoreError};

/// SHA-256 hex digest of the canonical JSON serialization of a request.
/// Callers normalize transport-only fields (the key itself) before hashing.
pub fn request_hash<T: Serialize>(request: &T) -> Result<String, AppError> {
    let bytes = serde_json::to_vec(request)
        .map_err(|err| AppError::Unexpected(format!("failed to hash request: {err}")))?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// Runs `op` under the idempotency protocol.
///
/// - No key (or a blank one): `op` runs directly, nothing is stored.
/// - Known key, same request hash: the stored response is replayed and
///   `op` never runs.
/// - Known key, different hash: `IdempotencyConflict`.
/// - New key: `op` runs and its response is fingerprinted before being
///   returned. If a concurrent request with the same key wins the insert
///   race, the loser replays the winner's stored response.
pub async fn execute<T, F, Fut>(
    store: &dyn FingerprintStore,
    key: Option<&str>,
    request_hash: &str,
    op: F,
) -> Result<T, AppError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let key = match key {
        Some(k) if !k.trim().is_empty() => k,
        _ => return op().await,
    };

    if let Some(found) = store.find(key).await? {
        debug!(idempotency_key = %key, "replaying stored response");
        return replay(&found, request_hash);
    }

    match op().await {
        Ok(response) => {
            let snapshot = serde_json::to_string(&response).map_err(|err| {
                AppError::Unexpected(format!("failed to snapshot response: {err}"))
            })?;
            let fingerprint = IdempotencyFingerprint::new(
                key.to_string(),
                request_hash.to_string(),
                snapshot,
            );

            match store.insert(&fingerprint).await {
                Ok(()) => Ok(response),
                Err(StoreError::UniqueViolation { .. }) => {
                    // A concurrent request with the same key stored its
                    // fingerprint first; its response wins.
                    warn!(idempotency_key = %key, "lost fingerprint insert race");
                    recover(store, key, request_hash, AppError::Unexpected(
                        format!("fingerprint for key {key} vanished after insert race"),
                    ))
                    .await
                }
                Err(err) => Err(err.into()),
            }
        }
        Err(AppError::Store(StoreError::UniqueViolation { constraint })) => {
            // The operation itself hit the key's unique constraint: another
            // request finished first. Replay its response if it is there.
            warn!(idempotency_key = %key, %constraint, "operation lost unique-key race");
            recover(
                store,
                key,
                request_hash,
                AppError::Store(StoreError::UniqueViolation { constraint }),
            )
            .await
        }
        Err(err) => Err(err),
    }
}

/// Last-resort fallback after a uniqueness race: re-fetch the winner's
/// fingerprint and replay it. An absent fingerprint means the store is
/// inconsistent, in which case the original failure propagates.
async fn recover<T: DeserializeOwned>(
    store: &dyn FingerprintStore,
    key: &str,
    request_hash: &str,
    original: AppError,
) -> Result<T, AppError> {
    match store.find(key).await? {
        Some(found) => replay(&found, request_hash),
        None => Err(original),
    }
}

fn replay<T: DeserializeOwned>(
    fingerprint: &IdempotencyFingerprint,
    request_hash: &str,
) -> Result<T, AppError> {
    if fingerprint.request_hash != request_hash {
        return Err(AppError::IdempotencyConflict);
    }
    serde_json::from_str(&fingerprint.response_json).map_err(|err| {
        AppError::Unexpected(format!(
            "corrupt response snapshot for idempotency key {}: {err}",
            fingerprint.key
        ))
    })
}
