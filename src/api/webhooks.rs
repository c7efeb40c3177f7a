//! Webhook handlers. Signatures are checked by the `webhook_signature`
//! middleware before any of these run.
//!
//! A replayed event answers 200 with `status: "already_processed"` so
//! retrying providers stop retrying.

use axum::{body::Bytes, extract::State, Json};
use serde_json::json;
use tracing::debug;

use super::dto::{parse, BoosterWebhook, PresaleWebhook, TaskWebhook, WalletWebhook, WebhookResponse};
use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::ledger::{
    BoosterPurchase, DedupKey, ExternalTaskClaim, PresalePurchase, WalletConnection,
};
use crate::types::Lamports;

fn lamports(state: &AppState, sol: f64) -> ApiResult<Lamports> {
    Lamports::from_sol(sol, state.ledger().config().max_payment)
        .map_err(|e| ApiError::validation(format!("amountSol: {e}")))
}

/// `POST /api/webhooks/booster`
pub async fn booster(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WebhookResponse>> {
    let payload: BoosterWebhook = parse(&body)?;
    let purchase = BoosterPurchase {
        user_id: payload.user_id,
        dedup_key: DedupKey::first_of(&[
            payload.transaction_hash.as_deref(),
            payload.wallet_tx_hash.as_deref(),
            payload.payment_id.as_deref(),
        ])?,
        paid: lamports(&state, payload.amount_sol.to_f64()?)?,
        booster_id: payload.booster_id,
        status: payload.status,
    };

    let outcome = state
        .with_ledger(move |ledger| ledger.apply_booster_purchase(&purchase))
        .await?;

    Ok(Json(WebhookResponse::from_outcome(outcome, |grant| {
        (
            format!("Booster {} activated", grant.booster_id),
            json!({
                "boosterId": grant.booster_id,
                "multiplier": grant.multiplier,
                "autoClaim": grant.auto_claim,
                "expiresAt": grant.expires_at,
            }),
        )
    })))
}

/// `POST /api/webhooks/presale`
pub async fn presale(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WebhookResponse>> {
    let payload: PresaleWebhook = parse(&body)?;
    let purchase = PresalePurchase {
        user_id: payload.user_id,
        dedup_key: DedupKey::first_of(&[
            payload.transaction_hash.as_deref(),
            payload.wallet_tx_hash.as_deref(),
            payload.payment_id.as_deref(),
        ])?,
        paid: lamports(&state, payload.amount_sol.to_f64()?)?,
        tokens: payload.tokens_amount.to_tokens()?,
        status: payload.status,
    };

    let outcome = state
        .with_ledger(move |ledger| ledger.apply_presale(&purchase))
        .await?;

    Ok(Json(WebhookResponse::from_outcome(outcome, |receipt| {
        (
            "Presale purchase credited".to_string(),
            json!({
                "tokensCredited": receipt.tokens.to_decimal_string(),
                "bonusTokens": receipt.bonus.to_decimal_string(),
                "tokenBalance": receipt.token_balance.to_decimal_string(),
            }),
        )
    })))
}

/// `POST /api/webhooks/task`
pub async fn external_task(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WebhookResponse>> {
    let payload: TaskWebhook = parse(&body)?;
    if let Some(data) = &payload.task_data {
        debug!(user_id = %payload.user_id, task = %payload.task_identifier, %data, "partner task data");
    }
    let claim = ExternalTaskClaim {
        user_id: payload.user_id,
        timestamp: payload.timestamp.to_millis()?,
        task_identifier: payload.task_identifier,
        points: payload.points,
    };
    let points = claim.points;

    let outcome = state
        .with_ledger(move |ledger| ledger.apply_external_task(&claim))
        .await?;

    Ok(Json(WebhookResponse::from_outcome(outcome, |balance| {
        (
            format!("Awarded {points} points"),
            json!({ "pointsAwarded": points, "newBalance": balance }),
        )
    })))
}

/// `POST /api/webhooks/wallet`
pub async fn wallet(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WebhookResponse>> {
    let payload: WalletWebhook = parse(&body)?;
    let connection = WalletConnection {
        user_id: payload.user_id,
        address: payload.wallet_address,
        wallet_type: payload.wallet_type,
    };

    let receipt = state
        .with_ledger(move |ledger| ledger.connect_wallet(&connection))
        .await?;

    let message = if receipt.bonus_awarded {
        format!(
            "Wallet connected! {} bonus tokens awarded",
            receipt.tokens_awarded.to_decimal_string()
        )
    } else {
        "Wallet connected".to_string()
    };
    Ok(Json(WebhookResponse::processed(
        message,
        json!({
            "walletAddress": receipt.address,
            "bonusAwarded": receipt.bonus_awarded,
            "tokenBalance": receipt.token_balance.to_decimal_string(),
        }),
    )))
}
