//! Handlers for signed-in user actions.
//!
//! The acting user always comes from the session token; a `userId` in the
//! body is only accepted when it names the same user.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::info;

use super::auth::AuthenticatedUser;
use super::dto::{
    parse, parse_or_default, BoosterView, ClaimRequest, CompleteTaskRequest, ConversionView,
    MeResponse, ProfileView, ReferralRequest, SignupReferral, SignupRequest, SignupResponse,
    Success,
};
use super::error::ApiResult;
use super::state::AppState;
use crate::ledger::{ClaimReceipt, ReferralReceipt, TaskBoardEntry, TaskOutcome};

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// `POST /api/signup`
pub async fn signup(State(state): State<AppState>, body: Bytes) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    let request: SignupRequest = parse_or_default(&body)?;

    let (profile, referral) = state
        .with_ledger(move |ledger| {
            let profile = ledger.create_profile()?;
            let referral = request.referral_code.map(|code| {
                match ledger.process_referral(&profile.id, &code) {
                    Ok(receipt) => SignupReferral {
                        success: true,
                        message: format!("Referral applied! You earned {} points.", receipt.bonus_points),
                    },
                    Err(e) => SignupReferral {
                        success: false,
                        message: e.to_string(),
                    },
                }
            });
            // reload: the referral may have changed the balance
            Ok((ledger.profile(&profile.id)?, referral))
        })
        .await?;

    let token = state.sessions().issue(&profile.id)?;
    info!(user_id = %profile.id, "signup");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            token,
            profile: ProfileView::from(&profile),
            referral,
        }),
    ))
}

/// `GET /api/me`
pub async fn me(State(state): State<AppState>, AuthenticatedUser(user): AuthenticatedUser) -> ApiResult<Json<MeResponse>> {
    let (profile, claim, grants) = state
        .with_ledger(move |ledger| {
            let claim = ledger.claim_status(&user)?;
            Ok((ledger.profile(&user)?, claim, ledger.active_grants(&user)?))
        })
        .await?;

    Ok(Json(MeResponse {
        profile: ProfileView::from(&profile),
        claim,
        active_boosters: grants.iter().map(BoosterView::from).collect(),
    }))
}

/// `GET /api/me/boosters`
pub async fn my_boosters(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Json<Vec<BoosterView>>> {
    let grants = state.with_ledger(move |ledger| ledger.active_grants(&user)).await?;
    Ok(Json(grants.iter().map(BoosterView::from).collect()))
}

/// `GET /api/me/conversions`
pub async fn my_conversions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Json<Vec<ConversionView>>> {
    let records = state
        .with_ledger(move |ledger| Ok(ledger.store().conversions(&user)?))
        .await?;
    Ok(Json(records.iter().map(ConversionView::from).collect()))
}

/// `GET /api/tasks`
pub async fn task_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Json<Vec<TaskBoardEntry>>> {
    let board = state.with_ledger(move |ledger| ledger.task_board(&user)).await?;
    Ok(Json(board))
}

/// `POST /api/claim`
pub async fn claim(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    body: Bytes,
) -> ApiResult<Json<Success<ClaimReceipt>>> {
    let request: ClaimRequest = parse_or_default(&body)?;
    auth.ensure_self(request.user_id)?;
    let user = auth.0;

    let receipt = state.with_ledger(move |ledger| ledger.claim(&user)).await?;
    Ok(Json(Success::new(
        format!("Claimed {} points!", receipt.points_awarded),
        receipt,
    )))
}

/// `POST /api/tasks/complete`
pub async fn complete_task(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    body: Bytes,
) -> ApiResult<Json<Success<TaskOutcome>>> {
    let request: CompleteTaskRequest = parse(&body)?;
    auth.ensure_self(request.user_id)?;
    let user = auth.0;

    let outcome = state
        .with_ledger(move |ledger| ledger.complete_task(&user, &request.task_id))
        .await?;

    let message = if outcome.bonus_awarded {
        format!(
            "Task completed! +{} points, plus the all-tasks bonus!",
            outcome.points_awarded
        )
    } else {
        format!("Task completed! +{} points", outcome.points_awarded)
    };
    Ok(Json(Success::new(message, outcome)))
}

/// `POST /api/referral`
pub async fn referral(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    body: Bytes,
) -> ApiResult<Json<Success<ReferralReceipt>>> {
    let request: ReferralRequest = parse(&body)?;
    auth.ensure_self(request.user_id)?;
    let user = auth.0;

    let receipt = state
        .with_ledger(move |ledger| ledger.process_referral(&user, &request.referral_code))
        .await?;
    Ok(Json(Success::new(
        format!("Referral applied! You earned {} points.", receipt.bonus_points),
        receipt,
    )))
}
