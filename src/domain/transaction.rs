//! Transaction domain entity.
//! Framework-agnostic representation of an NFT payment transaction.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fractional digits persisted for every amount.
pub const AMOUNT_SCALE: i64 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Escrow,
    Completed,
    Failed,
    Disputed,
}

impl TransactionStatus {
    /// Legal moves of the payment state machine. Completed, Failed and
    /// Disputed are terminal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Escrow) | (Pending, Completed) | (Pending, Failed) | (Escrow, Completed) | (Escrow, Disputed)
        )
    }

    pub fn is_terminal(self) -> bool {
        use TransactionStatus::*;
        matches!(self, Completed | Failed | Disputed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Escrow => "ESCROW",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Disputed => "DISPUTED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "ESCROW" => Ok(TransactionStatus::Escrow),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "DISPUTED" => Ok(TransactionStatus::Disputed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Crypto,
    CryptoStrk,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Crypto => "CRYPTO",
            PaymentMethod::CryptoStrk => "CRYPTO_STRK",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRYPTO" => Ok(PaymentMethod::Crypto),
            "CRYPTO_STRK" => Ok(PaymentMethod::CryptoStrk),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Escrow terms attached to a transaction. Serialized as-is into the
/// `escrow_details` jsonb column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowDetails {
    pub release_date: DateTime<Utc>,
    pub conditions: String,
    #[serde(default)]
    pub is_disputed: bool,
}

/// Optional per-request fraud signals captured at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_country: Option<String>,
}

/// Domain entity representing a payment transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub receiver_id: Uuid,
    pub nft_id: Uuid,
    pub auction_id: Uuid,
    pub amount: BigDecimal,
    pub payment_method: PaymentMethod,
    pub transaction_hash: Option<String>,
    pub status: TransactionStatus,
    pub escrow_details: Option<EscrowDetails>,
    pub royalty_split: Option<serde_json::Value>,
    pub fraud_signals: Option<FraudSignals>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl Transaction {
    pub fn new(
        buyer_id: Uuid,
        seller_id: Uuid,
        receiver_id: Uuid,
        nft_id: Uuid,
        auction_id: Uuid,
        amount: BigDecimal,
        payment_method: PaymentMethod,
        escrow_details: Option<EscrowDetails>,
        royalty_split: Option<serde_json::Value>,
        fraud_signals: Option<FraudSignals>,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            buyer_id,
            seller_id,
            receiver_id,
            nft_id,
            auction_id,
            amount: amount.with_scale(AMOUNT_SCALE),
            payment_method,
            transaction_hash: None,
            status: TransactionStatus::Pending,
            escrow_details,
            royalty_split,
            fraud_signals,
            idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }
}
