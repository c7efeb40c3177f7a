//! Durable ledger state.
//!
//! One sled tree per entity. Reads outside a transaction see committed data
//! only; every balance mutation goes through [`Store::transaction`], which
//! spans all trees so a causal record and the balance change it pays for
//! commit together or not at all.

mod keys;

pub use keys::{completion_key, conversion_key, grant_key, user_prefix};

use std::marker::PhantomData;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, Transactional, TransactionalTree,
};
use tracing::debug;

use crate::types::{
    ActiveBoosterGrant, BoosterDefinition, ConversionRecord, ExternalEventRecord, Profile,
    ReferralEdge, TaskCompletionRecord, TaskDefinition, UserId,
};

/// Result of a step inside a store transaction
pub type TxResult<T, E> = Result<T, ConflictableTransactionError<E>>;

#[derive(Clone, Copy)]
#[repr(usize)]
enum TreeId {
    Profiles,
    ReferralCodes,
    Wallets,
    Tasks,
    Completions,
    Referrals,
    Events,
    Boosters,
    Grants,
    Conversions,
    Meta,
}

const TREE_NAMES: [&str; 11] = [
    "profiles",
    "referral_codes",
    "wallets",
    "tasks",
    "completions",
    "referrals",
    "events",
    "boosters",
    "grants",
    "conversions",
    "meta",
];

/// Handle to the ledger database. Cheap to clone; clones share the database.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    trees: Vec<sled::Tree>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("trees", &TREE_NAMES.len())
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StateError> {
    bincode::serialize(value).map_err(|e| StateError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StateError> {
    bincode::deserialize(bytes).map_err(|e| StateError::Codec(e.to_string()))
}

fn decode_uuid(bytes: &[u8]) -> Result<UserId, StateError> {
    UserId::from_slice(bytes).map_err(|e| StateError::Codec(e.to_string()))
}

impl Store {
    /// Open (or create) a store at `path`
    ///
    /// # Errors
    /// Returns error if the database cannot be opened
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open a throwaway store that is deleted on drop
    ///
    /// # Errors
    /// Returns error if the database cannot be created
    pub fn temporary() -> Result<Self, StateError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StateError> {
        let trees = TREE_NAMES
            .iter()
            .map(|name| db.open_tree(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { db, trees })
    }

    fn tree(&self, id: TreeId) -> &sled::Tree {
        &self.trees[id as usize]
    }

    /// Run `f` atomically across every tree.
    ///
    /// `f` may be re-run on conflict, so it must not have side effects
    /// outside the transaction. Returning `Err(Abort(e))` rolls back all
    /// writes made by `f` and surfaces `e`.
    ///
    /// # Errors
    /// Returns the abort error, or a storage error wrapped in `E`
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: Fn(&Tx<'_, E>) -> TxResult<T, E>,
        E: From<StateError>,
    {
        let result = self
            .trees
            .as_slice()
            .transaction(|views: &Vec<TransactionalTree>| {
                f(&Tx {
                    views,
                    _abort: PhantomData,
                })
            });

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StateError::from(e).into()),
        }
    }

    /// Flush dirty pages to disk
    ///
    /// # Errors
    /// Returns error if the flush fails
    pub fn flush(&self) -> Result<(), StateError> {
        let bytes = self.db.flush()?;
        debug!(bytes, "flushed store");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Committed reads
    // ------------------------------------------------------------------

    fn get<T: DeserializeOwned>(&self, id: TreeId, key: &[u8]) -> Result<Option<T>, StateError> {
        self.tree(id)
            .get(key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn scan<T: DeserializeOwned>(&self, id: TreeId, prefix: &[u8]) -> Result<Vec<T>, StateError> {
        self.tree(id)
            .scan_prefix(prefix)
            .map(|item| {
                let (_, bytes) = item?;
                decode(&bytes)
            })
            .collect()
    }

    /// Get a profile
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn profile(&self, id: &UserId) -> Result<Option<Profile>, StateError> {
        self.get(TreeId::Profiles, id.to_string().as_bytes())
    }

    /// All profiles, in key order
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn profiles(&self) -> Result<Vec<Profile>, StateError> {
        self.scan(TreeId::Profiles, b"")
    }

    /// Resolve a referral code to its owner
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn user_by_referral_code(&self, code: &str) -> Result<Option<UserId>, StateError> {
        self.tree(TreeId::ReferralCodes)
            .get(code.as_bytes())?
            .map(|bytes| decode_uuid(&bytes))
            .transpose()
    }

    /// Resolve a wallet address to its owner
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn user_by_wallet(&self, address: &str) -> Result<Option<UserId>, StateError> {
        self.tree(TreeId::Wallets)
            .get(address.as_bytes())?
            .map(|bytes| decode_uuid(&bytes))
            .transpose()
    }

    /// Get a task definition
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn task(&self, id: &str) -> Result<Option<TaskDefinition>, StateError> {
        self.get(TreeId::Tasks, id.as_bytes())
    }

    /// All task definitions
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn tasks(&self) -> Result<Vec<TaskDefinition>, StateError> {
        self.scan(TreeId::Tasks, b"")
    }

    /// Get a booster definition
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn booster(&self, id: &str) -> Result<Option<BoosterDefinition>, StateError> {
        self.get(TreeId::Boosters, id.as_bytes())
    }

    /// All booster definitions
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn boosters(&self) -> Result<Vec<BoosterDefinition>, StateError> {
        self.scan(TreeId::Boosters, b"")
    }

    /// Every task completion of a user
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn completions(&self, user: &UserId) -> Result<Vec<TaskCompletionRecord>, StateError> {
        self.scan(TreeId::Completions, user_prefix(user).as_bytes())
    }

    /// Every booster grant of a user, expired ones included
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn grants(&self, user: &UserId) -> Result<Vec<ActiveBoosterGrant>, StateError> {
        self.scan(TreeId::Grants, user_prefix(user).as_bytes())
    }

    /// Every conversion of a user, oldest first
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn conversions(&self, user: &UserId) -> Result<Vec<ConversionRecord>, StateError> {
        self.scan(TreeId::Conversions, user_prefix(user).as_bytes())
    }

    /// The referral edge where `user` is the referred party
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn referral_of(&self, user: &UserId) -> Result<Option<ReferralEdge>, StateError> {
        self.get(TreeId::Referrals, user.to_string().as_bytes())
    }

    /// An applied external event
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn event(&self, dedup_key: &str) -> Result<Option<ExternalEventRecord>, StateError> {
        self.get(TreeId::Events, dedup_key.as_bytes())
    }

    /// Read a marker
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn meta(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.tree(TreeId::Meta).get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Write a marker
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn set_meta(&self, key: &str, value: &[u8]) -> Result<(), StateError> {
        self.tree(TreeId::Meta).insert(key.as_bytes(), value)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Catalogue writes (admin seeding)
    // ------------------------------------------------------------------

    /// Insert or replace a task definition
    ///
    /// # Errors
    /// Returns error if the id is unusable or on storage failure
    pub fn upsert_task(&self, task: &TaskDefinition) -> Result<(), StateError> {
        if !task.has_valid_id() {
            return Err(StateError::InvalidKey(task.id.clone()));
        }
        self.tree(TreeId::Tasks)
            .insert(task.id.as_bytes(), encode(task)?)?;
        Ok(())
    }

    /// Insert or replace a booster definition
    ///
    /// # Errors
    /// Returns error on storage failure
    pub fn upsert_booster(&self, booster: &BoosterDefinition) -> Result<(), StateError> {
        if booster.id.is_empty() || booster.id.contains(':') {
            return Err(StateError::InvalidKey(booster.id.clone()));
        }
        self.tree(TreeId::Boosters)
            .insert(booster.id.as_bytes(), encode(booster)?)?;
        Ok(())
    }
}

/// Typed view over all trees inside one transaction. `E` is the abort
/// error of the enclosing transaction.
pub struct Tx<'a, E> {
    views: &'a Vec<TransactionalTree>,
    _abort: PhantomData<fn() -> E>,
}

impl<E: From<StateError>> Tx<'_, E> {
    fn view(&self, id: TreeId) -> &TransactionalTree {
        &self.views[id as usize]
    }

    fn get<T: DeserializeOwned>(&self, id: TreeId, key: &[u8]) -> TxResult<Option<T>, E> {
        match self.view(id).get(key)? {
            Some(bytes) => decode(&bytes).map(Some).map_err(abort),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, id: TreeId, key: &[u8], value: &T) -> TxResult<(), E> {
        let bytes = encode(value).map_err(abort)?;
        self.view(id).insert(key, bytes)?;
        Ok(())
    }

    fn exists(&self, id: TreeId, key: &[u8]) -> TxResult<bool, E> {
        Ok(self.view(id).get(key)?.is_some())
    }

    /// Read a profile
    pub fn profile(&self, id: &UserId) -> TxResult<Option<Profile>, E> {
        self.get(TreeId::Profiles, id.to_string().as_bytes())
    }

    /// Write a profile
    pub fn put_profile(&self, profile: &Profile) -> TxResult<(), E> {
        self.put(TreeId::Profiles, profile.id.to_string().as_bytes(), profile)
    }

    /// Owner of a referral code
    pub fn referral_code_owner(
        &self,
        code: &str,
    ) -> TxResult<Option<UserId>, E> {
        match self.view(TreeId::ReferralCodes).get(code.as_bytes())? {
            Some(bytes) => decode_uuid(&bytes).map(Some).map_err(abort),
            None => Ok(None),
        }
    }

    /// Reserve a referral code for `user`
    pub fn put_referral_code(&self, code: &str, user: &UserId) -> TxResult<(), E> {
        self.view(TreeId::ReferralCodes)
            .insert(code.as_bytes(), user.as_bytes().as_slice())?;
        Ok(())
    }

    /// Owner of a wallet address
    pub fn wallet_owner(&self, address: &str) -> TxResult<Option<UserId>, E> {
        match self.view(TreeId::Wallets).get(address.as_bytes())? {
            Some(bytes) => decode_uuid(&bytes).map(Some).map_err(abort),
            None => Ok(None),
        }
    }

    /// Bind a wallet address to `user`
    pub fn put_wallet(&self, address: &str, user: &UserId) -> TxResult<(), E> {
        self.view(TreeId::Wallets)
            .insert(address.as_bytes(), user.as_bytes().as_slice())?;
        Ok(())
    }

    /// Does a completion record exist under `key`
    pub fn has_completion(&self, key: &str) -> TxResult<bool, E> {
        self.exists(TreeId::Completions, key.as_bytes())
    }

    /// Write a completion record
    pub fn put_completion(
        &self,
        key: &str,
        record: &TaskCompletionRecord,
    ) -> TxResult<(), E> {
        self.put(TreeId::Completions, key.as_bytes(), record)
    }

    /// The edge where `user` is the referred party
    pub fn referral_of(&self, user: &UserId) -> TxResult<Option<ReferralEdge>, E> {
        self.get(TreeId::Referrals, user.to_string().as_bytes())
    }

    /// Write a referral edge
    pub fn put_referral(&self, edge: &ReferralEdge) -> TxResult<(), E> {
        self.put(TreeId::Referrals, edge.referred_id.to_string().as_bytes(), edge)
    }

    /// Does an external event exist under `dedup_key`
    pub fn has_event(&self, dedup_key: &str) -> TxResult<bool, E> {
        self.exists(TreeId::Events, dedup_key.as_bytes())
    }

    /// Write an external event record under its dedup key
    pub fn put_event(&self, record: &ExternalEventRecord) -> TxResult<(), E> {
        self.put(TreeId::Events, record.dedup_key.as_bytes(), record)
    }

    /// Write a booster grant
    pub fn put_grant(&self, grant: &ActiveBoosterGrant) -> TxResult<(), E> {
        self.put(TreeId::Grants, grant_key(grant).as_bytes(), grant)
    }

    /// Does a conversion exist under `key`
    pub fn has_conversion(&self, key: &str) -> TxResult<bool, E> {
        self.exists(TreeId::Conversions, key.as_bytes())
    }

    /// Write a conversion record
    pub fn put_conversion(
        &self,
        record: &ConversionRecord,
    ) -> TxResult<(), E> {
        self.put(
            TreeId::Conversions,
            conversion_key(&record.user_id, record.batch_instant).as_bytes(),
            record,
        )
    }
}

fn abort<E: From<StateError>>(e: StateError) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(E::from(e))
}

/// State errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying database failure
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    /// Stored bytes could not be (de)serialized
    #[error("codec error: {0}")]
    Codec(String),
    /// Key contains reserved characters
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lamports;

    fn store() -> Store {
        Store::temporary().unwrap()
    }

    #[test]
    fn test_profile_roundtrip_through_transaction() {
        let store = store();
        let profile = Profile::new(UserId::new_v4(), "ABCDEFGH".into(), 42);

        store
            .transaction(|tx: &Tx<'_, StateError>| {
                tx.put_profile(&profile)?;
                tx.put_referral_code(&profile.referral_code, &profile.id)
            })
            .unwrap();

        assert_eq!(store.profile(&profile.id).unwrap(), Some(profile.clone()));
        assert_eq!(
            store.user_by_referral_code("ABCDEFGH").unwrap(),
            Some(profile.id)
        );
        assert_eq!(store.profiles().unwrap().len(), 1);
    }

    #[derive(Debug)]
    enum TestAbort {
        Rejected,
        State,
    }

    impl From<StateError> for TestAbort {
        fn from(_: StateError) -> Self {
            Self::State
        }
    }

    #[test]
    fn test_abort_rolls_back_every_tree() {
        let store = store();
        let profile = Profile::new(UserId::new_v4(), "ABCDEFGH".into(), 0);

        let result: Result<(), TestAbort> = store.transaction(|tx| {
            tx.put_profile(&profile)?;
            tx.put_referral_code(&profile.referral_code, &profile.id)?;
            Err(ConflictableTransactionError::Abort(TestAbort::Rejected))
        });

        assert!(matches!(result, Err(TestAbort::Rejected)));
        assert!(store.profile(&profile.id).unwrap().is_none());
        assert!(store.user_by_referral_code("ABCDEFGH").unwrap().is_none());
    }

    #[test]
    fn test_catalogue_upserts() {
        let store = store();
        let task = TaskDefinition {
            id: "join-telegram".into(),
            title: "Join".into(),
            reward: 1000,
            is_daily_repeatable: false,
            active: true,
            action_url: None,
        };
        store.upsert_task(&task).unwrap();
        assert_eq!(store.task("join-telegram").unwrap(), Some(task.clone()));

        let bad = TaskDefinition {
            id: "a:b".into(),
            ..task
        };
        assert!(matches!(store.upsert_task(&bad), Err(StateError::InvalidKey(_))));

        let booster = BoosterDefinition {
            id: "x2".into(),
            name: "2x".into(),
            multiplier: 2,
            auto_claim: false,
            duration_hours: 24,
            price: Lamports::from_whole_sol(1),
            active: true,
        };
        store.upsert_booster(&booster).unwrap();
        assert_eq!(store.boosters().unwrap(), vec![booster]);
    }

    #[test]
    fn test_meta_markers() {
        let store = store();
        assert!(store.meta("conversion:1").unwrap().is_none());
        store.set_meta("conversion:1", b"done").unwrap();
        assert_eq!(store.meta("conversion:1").unwrap(), Some(b"done".to_vec()));
    }
}
