//! Request and response bodies.
//!
//! Webhook payloads come from several providers with inconsistent field
//! names; the aliases below normalise them so the ledger only ever sees one
//! canonical name per field. Struct fields mirror the wire format
//! one-to-one.

#![allow(missing_docs)]

use chrono::DateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::ledger::{ClaimStatus, Outcome};
use crate::types::{
    ActiveBoosterGrant, ConversionRecord, ConversionStatus, Profile, Timestamp, TokenAmount,
    UserId,
};

/// Parse a JSON body, mapping failures to a 400
///
/// # Errors
/// Returns `Validation` if the body is not the expected JSON
pub fn parse<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("invalid body: {e}")))
}

/// Like [`parse`], but an empty body yields the default
///
/// # Errors
/// Returns `Validation` if a non-empty body is not the expected JSON
pub fn parse_or_default<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse(body)
}

// ============================================================================
// User actions
// ============================================================================

/// `POST /api/signup`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// Code to redeem right away
    #[serde(default, alias = "referral_code")]
    pub referral_code: Option<String>,
}

/// `POST /api/claim`; the body is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    /// Must match the session if present
    #[serde(default, alias = "user_id")]
    pub user_id: Option<UserId>,
}

/// `POST /api/tasks/complete`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    /// Task to complete
    #[serde(alias = "task_id")]
    pub task_id: String,
    /// Must match the session if present
    #[serde(default, alias = "user_id")]
    pub user_id: Option<UserId>,
}

/// `POST /api/referral`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRequest {
    /// Code to redeem
    #[serde(alias = "referral_code")]
    pub referral_code: String,
    /// Must match the session if present
    #[serde(default, alias = "user_id")]
    pub user_id: Option<UserId>,
}

/// Public view of a profile
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: UserId,
    pub points: u64,
    pub token_balance: String,
    pub referral_code: String,
    pub wallet_address: Option<String>,
    pub avatar_url: Option<String>,
    pub wallet_bonus_claimed: bool,
    pub task_completion_bonus_awarded: bool,
    pub presale_bonus_claimed: bool,
    pub created_at: Timestamp,
}

impl From<&Profile> for ProfileView {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            points: p.points,
            token_balance: p.tokens.to_decimal_string(),
            referral_code: p.referral_code.clone(),
            wallet_address: p.wallet_address.clone(),
            avatar_url: p.avatar_url.clone(),
            wallet_bonus_claimed: p.wallet_bonus_claimed,
            task_completion_bonus_awarded: p.task_completion_bonus_awarded,
            presale_bonus_claimed: p.presale_bonus_claimed,
            created_at: p.created_at,
        }
    }
}

/// An active booster
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterView {
    pub booster_id: String,
    pub multiplier: u32,
    pub auto_claim: bool,
    pub granted_at: Timestamp,
    pub expires_at: Timestamp,
}

impl From<&ActiveBoosterGrant> for BoosterView {
    fn from(g: &ActiveBoosterGrant) -> Self {
        Self {
            booster_id: g.booster_id.clone(),
            multiplier: g.multiplier,
            auto_claim: g.auto_claim,
            granted_at: g.granted_at,
            expires_at: g.expires_at,
        }
    }
}

/// A past conversion
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionView {
    pub points_converted: u64,
    pub tokens_received: String,
    pub fee: String,
    pub token_balance_after: String,
    pub status: ConversionStatus,
    pub batch_instant: Timestamp,
    pub created_at: Timestamp,
}

impl From<&ConversionRecord> for ConversionView {
    fn from(r: &ConversionRecord) -> Self {
        Self {
            points_converted: r.points_converted,
            tokens_received: r.tokens_received.to_decimal_string(),
            fee: r.fee.to_decimal_string(),
            token_balance_after: r.token_balance_after.to_decimal_string(),
            status: r.status,
            batch_instant: r.batch_instant,
            created_at: r.created_at,
        }
    }
}

/// `GET /api/me`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub profile: ProfileView,
    pub claim: ClaimStatus,
    pub active_boosters: Vec<BoosterView>,
}

/// Outcome of the optional referral at signup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupReferral {
    pub success: bool,
    pub message: String,
}

/// `POST /api/signup`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub success: bool,
    pub token: String,
    pub profile: ProfileView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<SignupReferral>,
}

/// Success envelope for user actions
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Success<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

// ============================================================================
// Webhooks
// ============================================================================

/// A number, or a decimal string for providers that avoid floats
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Decimal {
    Number(f64),
    Text(String),
}

impl Decimal {
    /// As a token amount
    ///
    /// # Errors
    /// Returns `Validation` if not a non-negative decimal with at most 9 places
    pub fn to_tokens(&self) -> ApiResult<TokenAmount> {
        match self {
            Self::Number(n) => TokenAmount::from_f64(*n),
            Self::Text(s) => TokenAmount::from_decimal_str(s),
        }
        .map_err(|e| ApiError::validation(format!("invalid token amount: {e}")))
    }

    /// As a float, for SOL amounts
    ///
    /// # Errors
    /// Returns `Validation` if not a number
    pub fn to_f64(&self) -> ApiResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ApiError::validation(format!("invalid amount: {s:?}"))),
        }
    }
}

/// Unix milliseconds, or an RFC 3339 string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    /// As Unix milliseconds
    ///
    /// # Errors
    /// Returns `Validation` for an unparseable string
    pub fn to_millis(&self) -> ApiResult<Timestamp> {
        match self {
            Self::Millis(ms) => Ok(*ms),
            Self::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| ApiError::validation(format!("invalid timestamp {s:?}: {e}"))),
        }
    }
}

/// `POST /api/webhooks/booster`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterWebhook {
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "booster_id")]
    pub booster_id: String,
    #[serde(default, alias = "payment_id")]
    pub payment_id: Option<String>,
    #[serde(default, alias = "wallet_tx_hash")]
    pub wallet_tx_hash: Option<String>,
    #[serde(default, alias = "transaction_hash")]
    pub transaction_hash: Option<String>,
    #[serde(alias = "amount_sol")]
    pub amount_sol: Decimal,
    pub status: String,
}

/// `POST /api/webhooks/presale`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresaleWebhook {
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "amount_sol")]
    pub amount_sol: Decimal,
    #[serde(alias = "tokens_amount")]
    pub tokens_amount: Decimal,
    #[serde(default, alias = "payment_id")]
    pub payment_id: Option<String>,
    #[serde(default, alias = "wallet_tx_hash")]
    pub wallet_tx_hash: Option<String>,
    #[serde(default, alias = "transaction_hash")]
    pub transaction_hash: Option<String>,
    pub status: String,
}

/// `POST /api/webhooks/task`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWebhook {
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "task_identifier")]
    pub task_identifier: String,
    pub points: u64,
    /// Partner context; logged, not interpreted
    #[serde(default, alias = "task_data")]
    pub task_data: Option<serde_json::Value>,
    pub timestamp: WireTimestamp,
}

/// `POST /api/webhooks/wallet`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletWebhook {
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "wallet_address", alias = "address")]
    pub wallet_address: String,
    #[serde(default, alias = "wallet_type")]
    pub wallet_type: Option<String>,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl WebhookResponse {
    /// Processed, with details
    #[must_use]
    pub fn processed(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            status: "processed",
            message: message.into(),
            data: Some(data),
        }
    }

    /// Build from a ledger outcome
    pub fn from_outcome<T>(
        outcome: Outcome<T>,
        on_applied: impl FnOnce(T) -> (String, serde_json::Value),
    ) -> Self {
        match outcome {
            Outcome::Applied(value) => {
                let (message, data) = on_applied(value);
                Self::processed(message, data)
            }
            Outcome::AlreadyProcessed => Self {
                success: true,
                status: "already_processed",
                message: "Event already processed".into(),
                data: None,
            },
            Outcome::Ignored(reason) => Self {
                success: true,
                status: "ignored",
                message: reason,
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_webhook_aliases() {
        let user = UserId::new_v4();
        for body in [
            format!(r#"{{"userId":"{user}","walletAddress":"abc"}}"#),
            format!(r#"{{"user_id":"{user}","wallet_address":"abc"}}"#),
            format!(r#"{{"user_id":"{user}","address":"abc","walletType":"phantom"}}"#),
        ] {
            let parsed: WalletWebhook = parse(body.as_bytes()).unwrap();
            assert_eq!(parsed.user_id, user);
            assert_eq!(parsed.wallet_address, "abc");
        }
    }

    #[test]
    fn test_decimal_inputs() {
        let n: Decimal = serde_json::from_str("1.5").unwrap();
        assert_eq!(n.to_tokens().unwrap(), TokenAmount::from_decimal_str("1.5").unwrap());

        let s: Decimal = serde_json::from_str(r#""10000""#).unwrap();
        assert_eq!(s.to_tokens().unwrap(), TokenAmount::from_tokens(10_000));
        assert!((s.to_f64().unwrap() - 10_000.0).abs() < f64::EPSILON);

        let bad: Decimal = serde_json::from_str(r#""lots""#).unwrap();
        assert!(bad.to_tokens().is_err());
    }

    #[test]
    fn test_wire_timestamp() {
        let ms: WireTimestamp = serde_json::from_str("1772409600000").unwrap();
        assert_eq!(ms.to_millis().unwrap(), 1_772_409_600_000);

        let text: WireTimestamp = serde_json::from_str(r#""2026-03-02T00:00:00Z""#).unwrap();
        assert_eq!(text.to_millis().unwrap(), 1_772_409_600_000);
    }

    #[test]
    fn test_empty_body_defaults() {
        let req: SignupRequest = parse_or_default(b"").unwrap();
        assert!(req.referral_code.is_none());
        assert!(parse::<CompleteTaskRequest>(b"{}").is_err());
    }
}
