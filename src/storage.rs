use chrono::{DateTime, Utc};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionResult, Transactional,
};
use sled::Db;

use crate::error::StoreError;
use crate::models::{SponsorshipStatus, Sponsorship, StatusChange, User};

/// Sled-backed store for users and sponsorships.
///
/// Trees:
/// - `users`: user id -> JSON [`User`]
/// - `users_by_email`: email -> user id (uniqueness index)
/// - `sponsorships`: `{creator_id}/{id}` -> JSON [`Sponsorship`]
/// - `status_history`: `{sponsorship_id}/{micros}/{id}` -> JSON [`StatusChange`]
///
/// Every sponsorship key starts with the owning creator id, so each lookup is
/// scoped to one creator by construction.
#[derive(Clone)] // sled handles are reference counted; clones share one database
pub struct Storage {
    db: Db,
    user_tree: sled::Tree,
    email_tree: sled::Tree,
    sponsorship_tree: sled::Tree,
    history_tree: sled::Tree,
}

fn sponsorship_key(creator_id: &str, id: &str) -> String {
    format!("{creator_id}/{id}")
}

fn abort(err: impl Into<StoreError>) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}

fn unwrap_tx<T>(result: TransactionResult<T, StoreError>) -> Result<T, StoreError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Sled(e),
    })
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop. Used by tests and dry runs.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let user_tree = db.open_tree("users")?;
        let email_tree = db.open_tree("users_by_email")?;
        let sponsorship_tree = db.open_tree("sponsorships")?;
        let history_tree = db.open_tree("status_history")?;
        Ok(Self {
            db,
            user_tree,
            email_tree,
            sponsorship_tree,
            history_tree,
        })
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    // --- Credentials ---

    /// Insert a new user. Fails with [`StoreError::DuplicateEmail`] when the
    /// email is already registered; the check and both writes are one transaction.
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let json = serde_json::to_vec(user)?;

        unwrap_tx((&self.user_tree, &self.email_tree).transaction(|(users, emails)| {
            if emails.get(user.email.as_bytes())?.is_some() {
                return Err(abort(StoreError::DuplicateEmail));
            }
            emails.insert(user.email.as_bytes(), user.id.as_bytes())?;
            users.insert(user.id.as_bytes(), json.as_slice())?;
            Ok(())
        }))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.email_tree.get(email.as_bytes())? else {
            return Ok(None);
        };
        let id = String::from_utf8(id.to_vec())
            .map_err(|_| StoreError::Corrupt(format!("users_by_email/{email}")))?;
        self.get_user_by_id(&id)
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        match self.user_tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // --- Sponsorships ---

    pub fn insert_sponsorship(&self, sponsorship: &Sponsorship) -> Result<(), StoreError> {
        let key = sponsorship_key(&sponsorship.creator_id, &sponsorship.id);
        self.sponsorship_tree
            .insert(key.as_bytes(), serde_json::to_vec(sponsorship)?)?;
        Ok(())
    }

    /// Active (not soft-deleted) sponsorship owned by `creator_id`.
    pub fn get_sponsorship(
        &self,
        creator_id: &str,
        id: &str,
    ) -> Result<Option<Sponsorship>, StoreError> {
        let key = sponsorship_key(creator_id, id);
        match self.sponsorship_tree.get(key.as_bytes())? {
            Some(bytes) => {
                let sponsorship: Sponsorship = serde_json::from_slice(&bytes)?;
                Ok(Some(sponsorship).filter(|s| !s.is_deleted()))
            }
            None => Ok(None),
        }
    }

    /// Page of a creator's active sponsorships, newest first, plus the total
    /// number of matching rows.
    pub fn list_sponsorships(
        &self,
        creator_id: &str,
        status: Option<SponsorshipStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Sponsorship>, usize), StoreError> {
        let prefix = format!("{creator_id}/");
        let mut rows = Vec::new();
        for item in self.sponsorship_tree.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let sponsorship: Sponsorship = serde_json::from_slice(&value)?;
            if sponsorship.is_deleted() {
                continue;
            }
            if status.is_some_and(|s| s != sponsorship.status) {
                continue;
            }
            rows.push(sponsorship);
        }

        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let total = rows.len();
        let page = rows.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    /// Overwrite an active sponsorship. Returns `false` if it is absent or
    /// already soft-deleted.
    pub fn update_sponsorship(&self, sponsorship: &Sponsorship) -> Result<bool, StoreError> {
        let key = sponsorship_key(&sponsorship.creator_id, &sponsorship.id);
        let json = serde_json::to_vec(sponsorship)?;

        unwrap_tx(self.sponsorship_tree.transaction(|tx| {
            let Some(bytes) = tx.get(key.as_bytes())? else {
                return Ok(false);
            };
            let current: Sponsorship = serde_json::from_slice(&bytes).map_err(abort)?;
            if current.is_deleted() {
                return Ok(false);
            }
            tx.insert(key.as_bytes(), json.as_slice())?;
            Ok(true)
        }))
    }

    /// Mark an active sponsorship deleted. Returns `false` if it is absent or
    /// already deleted.
    pub fn soft_delete_sponsorship(
        &self,
        creator_id: &str,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let key = sponsorship_key(creator_id, id);

        unwrap_tx(self.sponsorship_tree.transaction(|tx| {
            let Some(bytes) = tx.get(key.as_bytes())? else {
                return Ok(false);
            };
            let mut sponsorship: Sponsorship = serde_json::from_slice(&bytes).map_err(abort)?;
            if sponsorship.is_deleted() {
                return Ok(false);
            }
            sponsorship.deleted_at = Some(at);
            sponsorship.updated_at = at;
            let json = serde_json::to_vec(&sponsorship).map_err(abort)?;
            tx.insert(key.as_bytes(), json)?;
            Ok(true)
        }))
    }

    // --- Status history ---

    pub fn append_status_change(&self, change: &StatusChange) -> Result<(), StoreError> {
        let key = format!(
            "{}/{:020}/{}",
            change.sponsorship_id,
            change.changed_at.timestamp_micros(),
            change.id
        );
        self.history_tree
            .insert(key.as_bytes(), serde_json::to_vec(change)?)?;
        Ok(())
    }

    /// Status changes for one sponsorship, oldest first.
    pub fn status_history(&self, sponsorship_id: &str) -> Result<Vec<StatusChange>, StoreError> {
        let prefix = format!("{sponsorship_id}/");
        let mut changes = Vec::new();
        for item in self.history_tree.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            changes.push(serde_json::from_slice(&value)?);
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(id: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn deal(creator_id: &str, id: &str, created_at: DateTime<Utc>) -> Sponsorship {
        Sponsorship {
            id: id.to_string(),
            creator_id: creator_id.to_string(),
            brand_name: format!("Brand {id}"),
            product_service: String::new(),
            deal_amount: 100.0,
            priority: None,
            contact_name: String::new(),
            contact_email: String::new(),
            contact_phone: String::new(),
            description: String::new(),
            deliverables: vec![],
            target_audience: String::new(),
            start_date: None,
            end_date: None,
            status: SponsorshipStatus::PitchReceived,
            notes: String::new(),
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_user_email_is_unique() {
        let storage = Storage::temporary().expect("Failed to open storage");

        storage.create_user(&user("u1", "ana@x.com")).unwrap();
        let err = storage.create_user(&user("u2", "ana@x.com")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));

        // The losing insert must not leave a half-written user behind.
        assert!(storage.get_user_by_id("u2").unwrap().is_none());
        let found = storage.get_user_by_email("ana@x.com").unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(storage.get_user_by_email("bob@x.com").unwrap().is_none());
    }

    #[test]
    fn test_sponsorship_lookup_is_scoped_by_creator() {
        let storage = Storage::temporary().unwrap();
        storage.insert_sponsorship(&deal("alice", "d1", Utc::now())).unwrap();

        assert!(storage.get_sponsorship("alice", "d1").unwrap().is_some());
        assert!(storage.get_sponsorship("bob", "d1").unwrap().is_none());
        let (rows, total) = storage.list_sponsorships("bob", None, 0, 20).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_list_orders_newest_first_and_paginates() {
        let storage = Storage::temporary().unwrap();
        let base = Utc::now();
        for i in 0..5 {
            let d = deal("alice", &format!("d{i}"), base + Duration::seconds(i));
            storage.insert_sponsorship(&d).unwrap();
        }

        let (page, total) = storage.list_sponsorships("alice", None, 0, 2).unwrap();
        assert_eq!(total, 5);
        let ids: Vec<_> = page.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["d4", "d3"]);

        let (page, _) = storage.list_sponsorships("alice", None, 4, 2).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "d0");
    }

    #[test]
    fn test_soft_delete_hides_row_and_is_not_repeatable() {
        let storage = Storage::temporary().unwrap();
        storage.insert_sponsorship(&deal("alice", "d1", Utc::now())).unwrap();

        assert!(!storage.soft_delete_sponsorship("bob", "d1", Utc::now()).unwrap());
        assert!(storage.soft_delete_sponsorship("alice", "d1", Utc::now()).unwrap());
        assert!(!storage.soft_delete_sponsorship("alice", "d1", Utc::now()).unwrap());

        assert!(storage.get_sponsorship("alice", "d1").unwrap().is_none());
        let (rows, total) = storage.list_sponsorships("alice", None, 0, 20).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);

        let mut revived = deal("alice", "d1", Utc::now());
        revived.brand_name = "Revived".into();
        assert!(!storage.update_sponsorship(&revived).unwrap());
    }

    #[test]
    fn test_status_history_is_ordered() {
        let storage = Storage::temporary().unwrap();
        let base = Utc::now();
        let statuses = [
            (SponsorshipStatus::PitchReceived, SponsorshipStatus::Negotiating),
            (SponsorshipStatus::Negotiating, SponsorshipStatus::Contracted),
        ];
        for (i, (old, new)) in statuses.into_iter().enumerate() {
            storage
                .append_status_change(&StatusChange {
                    id: format!("h{i}"),
                    sponsorship_id: "d1".into(),
                    old_status: old,
                    new_status: new,
                    changed_at: base + Duration::seconds(i as i64),
                    changed_by: "alice".into(),
                    reason: String::new(),
                })
                .unwrap();
        }

        let history = storage.status_history("d1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_status, SponsorshipStatus::Negotiating);
        assert_eq!(history[1].new_status, SponsorshipStatus::Contracted);
        assert!(storage.status_history("d2").unwrap().is_empty());
    }
}
