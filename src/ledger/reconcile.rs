//! External event reconciler.
//!
//! Payment providers and partner platforms call back over webhooks. Each
//! event is authenticated at the HTTP boundary; here it is validated against
//! the catalogue, deduplicated on its natural key, and applied in a single
//! transaction together with its [`ExternalEventRecord`].
//!
//! Replays of an applied event return [`Outcome::AlreadyProcessed`], never an
//! error, so provider retries are harmless.

use tracing::{debug, info, warn};

use super::award::{self, Award, BonusFlag, Cause};
use super::guard::{self, DedupKey};
use super::{abort, Ledger, LedgerError, Outcome};
use crate::types::{
    calendar_day, is_valid_task_id, ActiveBoosterGrant, EventKind, ExternalEventRecord, Lamports,
    Timestamp, TokenAmount, UserId, LAMPORTS_PER_SOL, ONE_TOKEN,
};

/// Provider statuses that mean the payment settled
const SETTLED_STATUSES: [&str; 3] = ["completed", "confirmed", "success"];

fn is_settled(status: &str) -> bool {
    SETTLED_STATUSES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(status.trim()))
}

fn not_settled<T>(status: &str) -> Outcome<T> {
    Outcome::Ignored(format!("payment status {status:?} is not final"))
}

/// A paid booster, as reported by the payment provider
#[derive(Clone, Debug)]
pub struct BoosterPurchase {
    /// Buyer
    pub user_id: UserId,
    /// Booster bought
    pub booster_id: String,
    /// Payment dedup key
    pub dedup_key: DedupKey,
    /// Amount paid
    pub paid: Lamports,
    /// Provider status
    pub status: String,
}

/// A presale token purchase
#[derive(Clone, Debug)]
pub struct PresalePurchase {
    /// Buyer
    pub user_id: UserId,
    /// Payment dedup key
    pub dedup_key: DedupKey,
    /// Amount paid
    pub paid: Lamports,
    /// Tokens the provider says were bought
    pub tokens: TokenAmount,
    /// Provider status
    pub status: String,
}

/// Applied presale purchase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresaleReceipt {
    /// Tokens credited for the purchase
    pub tokens: TokenAmount,
    /// Early-bird bonus credited alongside
    pub bonus: TokenAmount,
    /// Token balance afterwards
    pub token_balance: TokenAmount,
}

/// A wallet connection reported by the wallet service
#[derive(Clone, Debug)]
pub struct WalletConnection {
    /// Profile connecting the wallet
    pub user_id: UserId,
    /// Public address
    pub address: String,
    /// Wallet software, informational
    pub wallet_type: Option<String>,
}

/// Applied wallet connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletReceipt {
    /// Bound address
    pub address: String,
    /// This connection paid the first-connection bonus
    pub bonus_awarded: bool,
    /// Tokens credited (zero when no bonus)
    pub tokens_awarded: TokenAmount,
    /// Token balance afterwards
    pub token_balance: TokenAmount,
}

/// A task completed on a partner platform
#[derive(Clone, Debug)]
pub struct ExternalTaskClaim {
    /// Beneficiary
    pub user_id: UserId,
    /// Partner task identifier
    pub task_identifier: String,
    /// Points to credit
    pub points: u64,
    /// When the partner saw the completion
    pub timestamp: Timestamp,
}

/// Base58 public keys are 32 to 44 characters
fn is_valid_wallet_address(address: &str) -> bool {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58.contains(c))
}

/// Tokens a presale payment buys at `tokens_per_sol`
fn presale_tokens(paid: Lamports, tokens_per_sol: u64) -> TokenAmount {
    TokenAmount::from_raw(
        u128::from(paid.0) * u128::from(tokens_per_sol) * ONE_TOKEN / u128::from(LAMPORTS_PER_SOL),
    )
}

impl Ledger {
    fn check_payment_range(&self, paid: Lamports) -> Result<(), LedgerError> {
        if paid.0 == 0 || paid > self.config().max_payment {
            return Err(LedgerError::Validation(format!(
                "payment amount out of range: {paid}"
            )));
        }
        Ok(())
    }

    /// Grant the purchased booster.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown booster, `Validation` for an
    /// inactive booster or a price mismatch, and error if the buyer has no
    /// profile or on storage failure
    pub fn apply_booster_purchase(
        &self,
        purchase: &BoosterPurchase,
    ) -> Result<Outcome<ActiveBoosterGrant>, LedgerError> {
        if !is_settled(&purchase.status) {
            debug!(key = %purchase.dedup_key, status = %purchase.status, "booster payment not settled");
            return Ok(not_settled(&purchase.status));
        }
        if self.has_been_processed(&purchase.dedup_key)? {
            return Ok(Outcome::AlreadyProcessed);
        }
        self.check_payment_range(purchase.paid)?;

        let booster = self
            .store()
            .booster(&purchase.booster_id)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "booster",
                id: purchase.booster_id.clone(),
            })?;
        if !booster.active {
            return Err(LedgerError::Validation(format!(
                "booster {} is not available",
                booster.id
            )));
        }
        let tolerance = self.config().price_tolerance_percent;
        if !purchase.paid.within_tolerance(booster.price, tolerance) {
            warn!(
                user_id = %purchase.user_id,
                booster_id = %booster.id,
                paid = %purchase.paid,
                price = %booster.price,
                "booster payment does not match price"
            );
            return Err(LedgerError::Validation(format!(
                "paid {} but {} costs {}",
                purchase.paid, booster.id, booster.price
            )));
        }

        let now = self.now();
        let grant = booster.grant(purchase.user_id, now, purchase.dedup_key.to_string());
        let record = ExternalEventRecord {
            dedup_key: purchase.dedup_key.to_string(),
            user_id: purchase.user_id,
            kind: EventKind::BoosterPurchase {
                booster_id: booster.id.clone(),
                paid: purchase.paid,
            },
            status: purchase.status.clone(),
            processed_at: now,
        };

        let applied = self.transact(|tx| {
            if guard::is_recorded(tx, &purchase.dedup_key)? {
                return Ok(false);
            }
            let mut profile =
                award::apply(tx, &purchase.user_id, Award::default(), Cause::ExternalEvent(&record))?;
            tx.put_grant(&grant)?;
            if grant.auto_claim && !profile.has_auto_claim {
                profile.has_auto_claim = true;
                tx.put_profile(&profile)?;
            }
            Ok(true)
        })?;

        if !applied {
            return Ok(Outcome::AlreadyProcessed);
        }
        info!(
            user_id = %purchase.user_id,
            booster_id = %grant.booster_id,
            multiplier = grant.multiplier,
            auto_claim = grant.auto_claim,
            expires_at = grant.expires_at,
            "booster granted"
        );
        Ok(Outcome::Applied(grant))
    }

    /// Credit presale tokens, plus the early-bird bonus on a first purchase.
    ///
    /// # Errors
    /// Returns `Validation` below the minimum or when the reported token
    /// amount disagrees with the sale rate, and error if the buyer has no
    /// profile or on storage failure
    pub fn apply_presale(&self, purchase: &PresalePurchase) -> Result<Outcome<PresaleReceipt>, LedgerError> {
        let config = self.config();
        if !is_settled(&purchase.status) {
            debug!(key = %purchase.dedup_key, status = %purchase.status, "presale payment not settled");
            return Ok(not_settled(&purchase.status));
        }
        if self.has_been_processed(&purchase.dedup_key)? {
            return Ok(Outcome::AlreadyProcessed);
        }
        self.check_payment_range(purchase.paid)?;
        if purchase.paid < config.presale_min {
            return Err(LedgerError::Validation(format!(
                "minimum presale purchase is {}",
                config.presale_min
            )));
        }

        let tokens = presale_tokens(purchase.paid, config.presale_tokens_per_sol);
        let allowed = tokens.percentage(config.price_tolerance_percent);
        let deviation = tokens
            .checked_sub(purchase.tokens)
            .or_else(|| purchase.tokens.checked_sub(tokens))
            .unwrap_or(TokenAmount::ZERO);
        if deviation > allowed {
            return Err(LedgerError::Validation(format!(
                "token amount {} does not match {} at the sale rate ({})",
                purchase.tokens.to_decimal_string(),
                purchase.paid,
                tokens.to_decimal_string()
            )));
        }

        let now = self.now();
        let early_bird_open = config.presale_early_bird_until.map_or(true, |until| now < until);
        let early_bird = tokens.percentage(config.presale_bonus_percent);

        let receipt = self.transact(|tx| {
            if guard::is_recorded(tx, &purchase.dedup_key)? {
                return Ok(None);
            }
            let Some(current) = tx.profile(&purchase.user_id)? else {
                return abort(LedgerError::profile_not_found(&purchase.user_id));
            };
            let bonus = if early_bird_open && !current.presale_bonus_claimed {
                early_bird
            } else {
                TokenAmount::ZERO
            };

            let record = ExternalEventRecord {
                dedup_key: purchase.dedup_key.to_string(),
                user_id: purchase.user_id,
                kind: EventKind::PresalePurchase {
                    paid: purchase.paid,
                    tokens,
                    bonus,
                },
                status: purchase.status.clone(),
                processed_at: now,
            };
            let mut profile =
                award::apply(tx, &purchase.user_id, Award::tokens(tokens), Cause::ExternalEvent(&record))?;
            if !bonus.is_zero() {
                profile = award::apply(
                    tx,
                    &purchase.user_id,
                    Award::tokens(bonus),
                    Cause::Bonus(BonusFlag::PresaleEarlyBird),
                )?;
            }
            Ok(Some(PresaleReceipt {
                tokens,
                bonus,
                token_balance: profile.tokens,
            }))
        })?;

        let Some(receipt) = receipt else {
            return Ok(Outcome::AlreadyProcessed);
        };
        info!(
            user_id = %purchase.user_id,
            paid = %purchase.paid,
            tokens = %receipt.tokens,
            bonus = %receipt.bonus,
            "presale purchase credited"
        );
        Ok(Outcome::Applied(receipt))
    }

    /// Bind a wallet address and pay the first-connection bonus once.
    ///
    /// Reconnecting the same address is a no-op; connecting a different
    /// address releases the old one.
    ///
    /// # Errors
    /// Returns `Validation` for a malformed address or one bound to another
    /// profile, and error if the profile does not exist or on storage failure
    pub fn connect_wallet(&self, connection: &WalletConnection) -> Result<WalletReceipt, LedgerError> {
        let address = connection.address.trim();
        if !is_valid_wallet_address(address) {
            return Err(LedgerError::Validation(format!(
                "malformed wallet address: {address:?}"
            )));
        }
        let user = &connection.user_id;
        let bonus = self.config().wallet_bonus_tokens;

        let (profile, bonus_awarded) = self.transact(|tx| {
            if let Some(owner) = tx.wallet_owner(address)? {
                if owner != *user {
                    return abort(LedgerError::Validation(
                        "wallet is already linked to another account".into(),
                    ));
                }
            }
            let Some(mut profile) = tx.profile(user)? else {
                return abort(LedgerError::profile_not_found(user));
            };

            // a previous address stays reserved to this profile
            if profile.wallet_address.as_deref() != Some(address) {
                tx.put_wallet(address, user)?;
                profile.wallet_address = Some(address.to_string());
                tx.put_profile(&profile)?;
            }

            if profile.wallet_bonus_claimed {
                return Ok((profile, false));
            }
            let profile = award::apply(tx, user, Award::tokens(bonus), Cause::Bonus(BonusFlag::WalletConnect))?;
            Ok((profile, true))
        })?;

        info!(
            user_id = %user,
            address,
            wallet_type = connection.wallet_type.as_deref().unwrap_or("unknown"),
            bonus_awarded,
            "wallet connected"
        );

        Ok(WalletReceipt {
            address: address.to_string(),
            bonus_awarded,
            tokens_awarded: if bonus_awarded { bonus } else { TokenAmount::ZERO },
            token_balance: profile.tokens,
        })
    }

    /// Credit a partner task, once per user, task and day. Returns the new
    /// point balance.
    ///
    /// # Errors
    /// Returns `Validation` for a malformed identifier, out-of-range points
    /// or a stale timestamp, and error if the profile does not exist or on
    /// storage failure
    pub fn apply_external_task(&self, claim: &ExternalTaskClaim) -> Result<Outcome<u64>, LedgerError> {
        let config = self.config();
        if !is_valid_task_id(&claim.task_identifier) {
            return Err(LedgerError::Validation(format!(
                "malformed task identifier: {:?}",
                claim.task_identifier
            )));
        }
        if !(1..=config.external_task_max_points).contains(&claim.points) {
            return Err(LedgerError::Validation(format!(
                "points must be between 1 and {}",
                config.external_task_max_points
            )));
        }
        let now = self.now();
        let skew = now.checked_sub(claim.timestamp).map(i64::unsigned_abs);
        let max_skew = config.external_task_max_skew_ms.unsigned_abs();
        if !matches!(skew, Some(skew) if skew <= max_skew) {
            return Err(LedgerError::Validation(
                "timestamp is too far from server time".into(),
            ));
        }

        let day = calendar_day(now, config.daily_reset_offset);
        let key = DedupKey::external_task(&claim.user_id, &claim.task_identifier, day);
        if self.has_been_processed(&key)? {
            return Ok(Outcome::AlreadyProcessed);
        }

        let record = ExternalEventRecord {
            dedup_key: key.to_string(),
            user_id: claim.user_id,
            kind: EventKind::ExternalTask {
                task_identifier: claim.task_identifier.clone(),
                points: claim.points,
            },
            status: "completed".into(),
            processed_at: now,
        };

        let balance = self.transact(|tx| {
            if guard::is_recorded(tx, &key)? {
                return Ok(None);
            }
            let profile =
                award::apply(tx, &claim.user_id, Award::points(claim.points), Cause::ExternalEvent(&record))?;
            Ok(Some(profile.points))
        })?;

        match balance {
            Some(points) => {
                info!(
                    user_id = %claim.user_id,
                    task = %claim.task_identifier,
                    points = claim.points,
                    "external task credited"
                );
                Ok(Outcome::Applied(points))
            }
            None => Ok(Outcome::AlreadyProcessed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::LedgerConfig;
    use super::*;
    use crate::types::{BoosterDefinition, Clock, HOUR_MS};

    const WALLET: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const OTHER_WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn seed_booster(ledger: &Ledger, id: &str, multiplier: u32, auto_claim: bool) -> BoosterDefinition {
        let booster = BoosterDefinition {
            id: id.into(),
            name: id.into(),
            multiplier,
            auto_claim,
            duration_hours: 24,
            price: Lamports::from_whole_sol(1),
            active: true,
        };
        ledger.store().upsert_booster(&booster).unwrap();
        booster
    }

    fn booster_purchase(user: UserId, booster: &str, tx: &str) -> BoosterPurchase {
        BoosterPurchase {
            user_id: user,
            booster_id: booster.into(),
            dedup_key: DedupKey::payment(tx).unwrap(),
            paid: Lamports::from_whole_sol(1),
            status: "completed".into(),
        }
    }

    fn presale(user: UserId, tx: &str, sol: u64) -> PresalePurchase {
        PresalePurchase {
            user_id: user,
            dedup_key: DedupKey::payment(tx).unwrap(),
            paid: Lamports::from_whole_sol(sol),
            tokens: TokenAmount::from_tokens(sol * 10_000),
            status: "confirmed".into(),
        }
    }

    #[test]
    fn test_booster_purchase_is_idempotent() {
        let (ledger, _) = ledger();
        seed_booster(&ledger, "x2", 2, false);
        let user = ledger.create_profile().unwrap().id;
        let purchase = booster_purchase(user, "x2", "sig1");

        let first = ledger.apply_booster_purchase(&purchase).unwrap();
        let Outcome::Applied(grant) = first else {
            panic!("expected a booster grant");
        };
        assert_eq!(grant.expires_at, T0 + 24 * HOUR_MS);

        assert_eq!(
            ledger.apply_booster_purchase(&purchase).unwrap(),
            Outcome::AlreadyProcessed
        );
        assert_eq!(ledger.store().grants(&user).unwrap().len(), 1);
        assert!(ledger.store().event("tx:sig1").unwrap().is_some());
    }

    #[test]
    fn test_concurrent_duplicate_deliveries_apply_once() {
        let (ledger, _) = ledger();
        seed_booster(&ledger, "x2", 2, false);
        let user = ledger.create_profile().unwrap().id;
        let purchase = booster_purchase(user, "x2", "sig-race");

        let applied = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| ledger.apply_booster_purchase(&purchase).unwrap().is_applied()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|applied| *applied)
                .count()
        });

        assert_eq!(applied, 1);
        assert_eq!(ledger.store().grants(&user).unwrap().len(), 1);
    }

    #[test]
    fn test_booster_validation() {
        let (ledger, _) = ledger();
        let mut retired = seed_booster(&ledger, "old", 3, false);
        retired.active = false;
        ledger.store().upsert_booster(&retired).unwrap();
        seed_booster(&ledger, "x2", 2, false);
        let user = ledger.create_profile().unwrap().id;

        assert!(matches!(
            ledger.apply_booster_purchase(&booster_purchase(user, "nope", "a1")),
            Err(LedgerError::NotFound { entity: "booster", .. })
        ));
        assert!(matches!(
            ledger.apply_booster_purchase(&booster_purchase(user, "old", "a2")),
            Err(LedgerError::Validation(_))
        ));

        let mut cheap = booster_purchase(user, "x2", "a3");
        cheap.paid = Lamports(980_000_000);
        assert!(matches!(
            ledger.apply_booster_purchase(&cheap),
            Err(LedgerError::Validation(_))
        ));

        // within 1%
        let mut close = booster_purchase(user, "x2", "a4");
        close.paid = Lamports(995_000_000);
        assert!(ledger.apply_booster_purchase(&close).unwrap().is_applied());

        // nothing was recorded for the rejected attempts
        for key in ["tx:a1", "tx:a2", "tx:a3"] {
            assert!(ledger.store().event(key).unwrap().is_none());
        }
    }

    #[test]
    fn test_pending_payment_ignored() {
        let (ledger, _) = ledger();
        seed_booster(&ledger, "x2", 2, false);
        let user = ledger.create_profile().unwrap().id;
        let mut purchase = booster_purchase(user, "x2", "pending1");
        purchase.status = "pending".into();

        assert!(matches!(
            ledger.apply_booster_purchase(&purchase).unwrap(),
            Outcome::Ignored(_)
        ));
        assert!(ledger.store().grants(&user).unwrap().is_empty());

        // the settled delivery still applies later
        purchase.status = "SUCCESS".into();
        assert!(ledger.apply_booster_purchase(&purchase).unwrap().is_applied());
    }

    #[test]
    fn test_auto_claim_booster_sets_flag() {
        let (ledger, _) = ledger();
        seed_booster(&ledger, "auto", 1, true);
        let user = ledger.create_profile().unwrap().id;

        ledger
            .apply_booster_purchase(&booster_purchase(user, "auto", "auto1"))
            .unwrap();
        assert!(ledger.profile(&user).unwrap().has_auto_claim);
    }

    #[test]
    fn test_booster_for_missing_profile_writes_nothing() {
        let (ledger, _) = ledger();
        seed_booster(&ledger, "x2", 2, false);
        let ghost = UserId::new_v4();

        assert!(matches!(
            ledger.apply_booster_purchase(&booster_purchase(ghost, "x2", "ghost1")),
            Err(LedgerError::NotFound { entity: "profile", .. })
        ));
        assert!(ledger.store().grants(&ghost).unwrap().is_empty());
        assert!(ledger.store().event("tx:ghost1").unwrap().is_none());
    }

    #[test]
    fn test_presale_with_early_bird_once() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;

        let Outcome::Applied(first) = ledger.apply_presale(&presale(user, "p1", 1)).unwrap() else {
            panic!("first purchase should apply");
        };
        assert_eq!(first.tokens, TokenAmount::from_tokens(10_000));
        assert_eq!(first.bonus, TokenAmount::from_tokens(1_000));
        assert_eq!(first.token_balance, TokenAmount::from_tokens(11_000));

        let Outcome::Applied(second) = ledger.apply_presale(&presale(user, "p2", 2)).unwrap() else {
            panic!("second purchase should apply");
        };
        assert!(second.bonus.is_zero());
        assert_eq!(second.token_balance, TokenAmount::from_tokens(31_000));

        assert_eq!(
            ledger.apply_presale(&presale(user, "p1", 1)).unwrap(),
            Outcome::AlreadyProcessed
        );
        assert_eq!(
            ledger.profile(&user).unwrap().tokens,
            TokenAmount::from_tokens(31_000)
        );
    }

    #[test]
    fn test_presale_after_early_bird_window() {
        let config = LedgerConfig {
            presale_early_bird_until: Some(T0),
            ..LedgerConfig::default()
        };
        let (ledger, _) = ledger_with(config);
        let user = ledger.create_profile().unwrap().id;

        let Outcome::Applied(receipt) = ledger.apply_presale(&presale(user, "late", 1)).unwrap() else {
            panic!("purchase should apply");
        };
        assert!(receipt.bonus.is_zero());
        assert!(!ledger.profile(&user).unwrap().presale_bonus_claimed);
    }

    #[test]
    fn test_presale_validation() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;

        let mut tiny = presale(user, "tiny", 1);
        tiny.paid = Lamports(50_000_000);
        tiny.tokens = TokenAmount::from_tokens(500);
        assert!(matches!(ledger.apply_presale(&tiny), Err(LedgerError::Validation(_))));

        let mut inflated = presale(user, "inflated", 1);
        inflated.tokens = TokenAmount::from_tokens(20_000);
        assert!(matches!(ledger.apply_presale(&inflated), Err(LedgerError::Validation(_))));

        assert!(ledger.profile(&user).unwrap().tokens.is_zero());
    }

    #[test]
    fn test_wallet_bonus_once() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;
        let connection = WalletConnection {
            user_id: user,
            address: WALLET.into(),
            wallet_type: Some("phantom".into()),
        };

        let first = ledger.connect_wallet(&connection).unwrap();
        assert!(first.bonus_awarded);
        assert_eq!(first.token_balance, TokenAmount::from_tokens(100));

        let again = ledger.connect_wallet(&connection).unwrap();
        assert!(!again.bonus_awarded);
        assert!(again.tokens_awarded.is_zero());

        let switched = ledger
            .connect_wallet(&WalletConnection {
                address: OTHER_WALLET.into(),
                ..connection.clone()
            })
            .unwrap();
        assert!(!switched.bonus_awarded);

        let profile = ledger.profile(&user).unwrap();
        assert_eq!(profile.tokens, TokenAmount::from_tokens(100));
        assert_eq!(profile.wallet_address.as_deref(), Some(OTHER_WALLET));
        assert_eq!(ledger.store().user_by_wallet(WALLET).unwrap(), Some(user));
        assert_eq!(ledger.store().user_by_wallet(OTHER_WALLET).unwrap(), Some(user));

        // switching back to the first address is allowed
        let back = ledger.connect_wallet(&connection).unwrap();
        assert_eq!(back.address, WALLET);
        assert_eq!(ledger.profile(&user).unwrap().wallet_address.as_deref(), Some(WALLET));
    }

    #[test]
    fn test_released_wallet_cannot_move_to_another_profile() {
        let (ledger, _) = ledger();
        let alice = ledger.create_profile().unwrap().id;
        let bob = ledger.create_profile().unwrap().id;
        let connect = |user_id, address: &str| {
            ledger.connect_wallet(&WalletConnection {
                user_id,
                address: address.into(),
                wallet_type: None,
            })
        };

        connect(alice, WALLET).unwrap();
        connect(alice, OTHER_WALLET).unwrap();

        assert!(matches!(connect(bob, WALLET), Err(LedgerError::Validation(_))));
        assert_eq!(ledger.store().user_by_wallet(WALLET).unwrap(), Some(alice));
        let profile = ledger.profile(&bob).unwrap();
        assert!(profile.wallet_address.is_none());
        assert!(profile.tokens.is_zero());
    }

    #[test]
    fn test_wallet_owned_by_someone_else() {
        let (ledger, _) = ledger();
        let alice = ledger.create_profile().unwrap().id;
        let bob = ledger.create_profile().unwrap().id;
        ledger
            .connect_wallet(&WalletConnection {
                user_id: alice,
                address: WALLET.into(),
                wallet_type: None,
            })
            .unwrap();

        let result = ledger.connect_wallet(&WalletConnection {
            user_id: bob,
            address: WALLET.into(),
            wallet_type: None,
        });
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert!(ledger.profile(&bob).unwrap().tokens.is_zero());

        assert!(matches!(
            ledger.connect_wallet(&WalletConnection {
                user_id: bob,
                address: "0xdeadbeef".into(),
                wallet_type: None,
            }),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_external_task_once_per_day() {
        let (ledger, clock) = ledger();
        let user = ledger.create_profile().unwrap().id;
        let claim = ExternalTaskClaim {
            user_id: user,
            task_identifier: "partner-quest".into(),
            points: 250,
            timestamp: T0,
        };

        assert_eq!(ledger.apply_external_task(&claim).unwrap(), Outcome::Applied(250));
        assert_eq!(
            ledger.apply_external_task(&claim).unwrap(),
            Outcome::AlreadyProcessed
        );

        clock.advance(24 * HOUR_MS);
        let next_day = ExternalTaskClaim {
            timestamp: clock.now(),
            ..claim
        };
        assert_eq!(ledger.apply_external_task(&next_day).unwrap(), Outcome::Applied(500));
    }

    #[test]
    fn test_external_task_validation() {
        let (ledger, _) = ledger();
        let user = ledger.create_profile().unwrap().id;
        let valid = ExternalTaskClaim {
            user_id: user,
            task_identifier: "quest".into(),
            points: 10,
            timestamp: T0,
        };

        let cases = [
            ExternalTaskClaim { points: 0, ..valid.clone() },
            ExternalTaskClaim { points: 10_001, ..valid.clone() },
            ExternalTaskClaim { task_identifier: "a:b".into(), ..valid.clone() },
            ExternalTaskClaim { timestamp: T0 - 25 * HOUR_MS, ..valid.clone() },
            ExternalTaskClaim { timestamp: i64::MIN, ..valid.clone() },
            ExternalTaskClaim { timestamp: i64::MAX, ..valid.clone() },
            ExternalTaskClaim { timestamp: 0, ..valid.clone() },
        ];
        for claim in &cases {
            assert!(matches!(
                ledger.apply_external_task(claim),
                Err(LedgerError::Validation(_))
            ));
        }
        assert_eq!(ledger.profile(&user).unwrap().points, 0);
    }
}
