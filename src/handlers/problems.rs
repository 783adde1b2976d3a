//! Plain documentation for problem `type` URIs, so the links inside RFC
//! 7807 payloads resolve to something readable.

use axum::extract::Path;
use axum::http::StatusCode;

pub async fn describe(Path(slug): Path<String>) -> (StatusCode, &'static str) {
    let doc = match slug.as_str() {
        "validation" => "Validation failed: the request body did not meet required constraints.",
        "not-found" => "The requested resource was not found.",
        "idempotency-conflict" => {
            "The idempotency key was already used with a different request body."
        }
        "invalid-signature" => "The webhook signature did not match the request body.",
        "rate-limit" => "Too many requests from this address. Retry later.",
        "invalid-state-transition" => {
            "The transaction is not in a state that allows this operation."
        }
        "escrow-update" => "The escrow update was rejected by the storage layer.",
        "seller-resolution" => "The seller for this NFT could not be resolved.",
        "storage" => "A storage error occurred while processing the request.",
        "internal-error" => "An unexpected server error occurred. Please contact support.",
        _ => return (StatusCode::NOT_FOUND, "Unknown problem type."),
    };

    (StatusCode::OK, doc)
}
