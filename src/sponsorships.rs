//! Sponsorship lifecycle: creation rules, partial updates, soft deletion and
//! status history. Every operation is scoped to the caller's creator id.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ApiError, FieldErrors};
use crate::models::{Identity, Sponsorship, SponsorshipInput, SponsorshipStatus, StatusChange};
use crate::storage::Storage;

#[derive(Clone)]
pub struct SponsorshipService {
    storage: Arc<Storage>,
}

/// Reject a create request before it reaches the store.
pub fn validate_new(input: &SponsorshipInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if input.brand_name.trim().is_empty() {
        errors.insert("brandName".into(), "Brand name is required".into());
    }
    // NaN fails this comparison too.
    if !(input.deal_amount > 0.0) {
        errors.insert("dealAmount".into(), "Deal amount must be greater than 0".into());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Merge `patch` into `target`, overwriting only non-empty, non-zero, present
/// values. Returns the previous status when the patch changed it.
pub fn apply_patch(
    target: &mut Sponsorship,
    patch: SponsorshipInput,
) -> Option<SponsorshipStatus> {
    fn set_text(field: &mut String, value: String) {
        if !value.is_empty() {
            *field = value;
        }
    }

    set_text(&mut target.brand_name, patch.brand_name);
    set_text(&mut target.product_service, patch.product_service);
    if patch.deal_amount > 0.0 {
        target.deal_amount = patch.deal_amount;
    }
    if patch.priority.is_some() {
        target.priority = patch.priority;
    }
    set_text(&mut target.contact_name, patch.contact_name);
    set_text(&mut target.contact_email, patch.contact_email);
    set_text(&mut target.contact_phone, patch.contact_phone);
    set_text(&mut target.description, patch.description);
    if !patch.deliverables.is_empty() {
        target.deliverables = patch.deliverables;
    }
    set_text(&mut target.target_audience, patch.target_audience);
    if patch.start_date.is_some() {
        target.start_date = patch.start_date;
    }
    if patch.end_date.is_some() {
        target.end_date = patch.end_date;
    }
    set_text(&mut target.notes, patch.notes);

    match patch.status {
        Some(status) if status != target.status => {
            Some(std::mem::replace(&mut target.status, status))
        }
        _ => None,
    }
}

impl SponsorshipService {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, identity, input), fields(creator_id = %identity.creator_id))]
    pub fn create(
        &self,
        identity: &Identity,
        input: SponsorshipInput,
    ) -> Result<Sponsorship, ApiError> {
        if let Err(fields) = validate_new(&input) {
            warn!(?fields, "create sponsorship validation failed");
            return Err(ApiError::Validation(fields));
        }

        let now = Utc::now();
        let sponsorship = Sponsorship {
            id: Uuid::new_v4().to_string(),
            creator_id: identity.creator_id.clone(),
            brand_name: input.brand_name,
            product_service: input.product_service,
            deal_amount: input.deal_amount,
            priority: input.priority,
            contact_name: input.contact_name,
            contact_email: input.contact_email,
            contact_phone: input.contact_phone,
            description: input.description,
            deliverables: input.deliverables,
            target_audience: input.target_audience,
            start_date: input.start_date,
            end_date: input.end_date,
            status: SponsorshipStatus::PitchReceived,
            notes: input.notes,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.storage.insert_sponsorship(&sponsorship)?;
        info!(
            sponsorship_id = %sponsorship.id,
            brand = %sponsorship.brand_name,
            "sponsorship created"
        );
        Ok(sponsorship)
    }

    #[instrument(skip(self, identity), fields(creator_id = %identity.creator_id))]
    pub fn get(&self, identity: &Identity, id: &str) -> Result<Sponsorship, ApiError> {
        self.storage
            .get_sponsorship(&identity.creator_id, id)?
            .ok_or_else(|| {
                debug!("sponsorship not found");
                ApiError::NotFound
            })
    }

    /// A page of active sponsorships, newest first, and the matching total.
    #[instrument(skip(self, identity), fields(creator_id = %identity.creator_id))]
    pub fn list(
        &self,
        identity: &Identity,
        status: Option<SponsorshipStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Sponsorship>, usize), ApiError> {
        let (rows, total) =
            self.storage
                .list_sponsorships(&identity.creator_id, status, offset, limit)?;
        debug!(returned = rows.len(), total, "listed sponsorships");
        Ok((rows, total))
    }

    /// Partial update. Concurrent updates to one deal are last-write-wins.
    #[instrument(skip(self, identity, patch), fields(creator_id = %identity.creator_id))]
    pub fn update(
        &self,
        identity: &Identity,
        id: &str,
        patch: SponsorshipInput,
    ) -> Result<Sponsorship, ApiError> {
        let mut sponsorship = self.get(identity, id)?;
        let reason = patch.status_reason.clone();
        let previous_status = apply_patch(&mut sponsorship, patch);
        let now = Utc::now();
        sponsorship.updated_at = now;

        if !self.storage.update_sponsorship(&sponsorship)? {
            // Deleted between load and write.
            return Err(ApiError::NotFound);
        }

        if let Some(old_status) = previous_status {
            self.storage.append_status_change(&StatusChange {
                id: Uuid::new_v4().to_string(),
                sponsorship_id: sponsorship.id.clone(),
                old_status,
                new_status: sponsorship.status,
                changed_at: now,
                changed_by: identity.user_id.clone(),
                reason,
            })?;
        }

        info!(
            sponsorship_id = %sponsorship.id,
            status = %sponsorship.status,
            "sponsorship updated"
        );
        Ok(sponsorship)
    }

    #[instrument(skip(self, identity), fields(creator_id = %identity.creator_id))]
    pub fn delete(&self, identity: &Identity, id: &str) -> Result<(), ApiError> {
        if self
            .storage
            .soft_delete_sponsorship(&identity.creator_id, id, Utc::now())?
        {
            info!("sponsorship deleted");
            Ok(())
        } else {
            warn!("delete of missing sponsorship");
            Err(ApiError::NotFound)
        }
    }

    #[instrument(skip(self, identity), fields(creator_id = %identity.creator_id))]
    pub fn history(&self, identity: &Identity, id: &str) -> Result<Vec<StatusChange>, ApiError> {
        let sponsorship = self.get(identity, id)?;
        Ok(self.storage.status_history(&sponsorship.id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(creator: &str) -> Identity {
        Identity {
            user_id: creator.to_string(),
            email: format!("{creator}@x.com"),
            creator_id: creator.to_string(),
        }
    }

    fn service() -> (SponsorshipService, Arc<Storage>) {
        let storage = Arc::new(Storage::temporary().expect("temporary storage"));
        (SponsorshipService::new(storage.clone()), storage)
    }

    fn acme() -> SponsorshipInput {
        SponsorshipInput {
            brand_name: "Acme".into(),
            product_service: "Rockets".into(),
            deal_amount: 500.0,
            contact_name: "Wile".into(),
            deliverables: vec!["1 video".into(), "2 posts".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_create_forces_initial_status_and_fresh_id() {
        let (svc, _) = service();
        let input = SponsorshipInput {
            status: Some(SponsorshipStatus::Completed),
            ..acme()
        };

        let created = svc.create(&identity("alice"), input).unwrap();
        assert_eq!(created.status, SponsorshipStatus::PitchReceived);
        assert_eq!(created.creator_id, "alice");
        assert!(Uuid::parse_str(&created.id).is_ok());
        assert_eq!(created.created_at, created.updated_at);
    }

    #[test]
    fn test_invalid_create_never_reaches_store() {
        let (svc, storage) = service();
        let alice = identity("alice");

        for input in [
            SponsorshipInput { deal_amount: 0.0, ..acme() },
            SponsorshipInput { deal_amount: -10.0, ..acme() },
            SponsorshipInput { brand_name: String::new(), ..acme() },
            SponsorshipInput { deal_amount: f64::NAN, ..acme() },
        ] {
            let err = svc.create(&alice, input).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }

        let (_, total) = storage.list_sponsorships("alice", None, 0, 100).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_validation_reports_only_failing_fields() {
        let fields = validate_new(&SponsorshipInput {
            deal_amount: 0.0,
            ..acme()
        })
        .unwrap_err();
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("dealAmount"));
    }

    #[test]
    fn test_other_creator_cannot_see_or_touch_deal() {
        let (svc, _) = service();
        let created = svc.create(&identity("alice"), acme()).unwrap();
        let bob = identity("bob");

        assert!(matches!(svc.get(&bob, &created.id), Err(ApiError::NotFound)));
        let (rows, total) = svc.list(&bob, None, 0, 20).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
        assert!(matches!(
            svc.update(&bob, &created.id, acme()),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(svc.delete(&bob, &created.id), Err(ApiError::NotFound)));

        // Still intact for the owner.
        assert_eq!(svc.get(&identity("alice"), &created.id).unwrap(), created);
    }

    #[test]
    fn test_status_only_update_leaves_other_fields() {
        let (svc, _) = service();
        let alice = identity("alice");
        let created = svc.create(&alice, acme()).unwrap();

        let updated = svc
            .update(
                &alice,
                &created.id,
                SponsorshipInput {
                    status: Some(SponsorshipStatus::Contracted),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, SponsorshipStatus::Contracted);
        assert!(updated.updated_at >= created.updated_at);
        let mut expected = created.clone();
        expected.status = SponsorshipStatus::Contracted;
        expected.updated_at = updated.updated_at;
        assert_eq!(updated, expected);
        assert_eq!(svc.get(&alice, &created.id).unwrap(), updated);
    }

    #[test]
    fn test_empty_values_do_not_clear_fields() {
        let (svc, _) = service();
        let mut deal = svc.create(&identity("alice"), acme()).unwrap();
        let before = deal.clone();

        let changed = apply_patch(
            &mut deal,
            SponsorshipInput {
                contact_name: String::new(),
                deal_amount: -1.0,
                deliverables: vec![],
                ..Default::default()
            },
        );
        assert!(changed.is_none());
        assert_eq!(deal, before);
    }

    #[test]
    fn test_status_reason_lands_on_history_entry() {
        let (svc, _) = service();
        let alice = identity("alice");
        let created = svc.create(&alice, acme()).unwrap();

        let updated = svc
            .update(
                &alice,
                &created.id,
                SponsorshipInput {
                    status: Some(SponsorshipStatus::Approved),
                    status_reason: "Budget signed off".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        // The reason alone is not a field change on the deal.
        assert_eq!(updated.status, SponsorshipStatus::Approved);
        assert_eq!(updated.notes, created.notes);

        let history = svc.history(&alice, &created.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, "Budget signed off");
    }

    #[test]
    fn test_status_changes_are_recorded() {
        let (svc, _) = service();
        let alice = identity("alice");
        let created = svc.create(&alice, acme()).unwrap();

        for status in [
            SponsorshipStatus::Negotiating,
            SponsorshipStatus::Negotiating,
            SponsorshipStatus::Approved,
        ] {
            let patch = SponsorshipInput {
                status: Some(status),
                ..Default::default()
            };
            svc.update(&alice, &created.id, patch).unwrap();
        }
        // A brand-only change records nothing.
        let patch = SponsorshipInput {
            brand_name: "Acme Corp".into(),
            ..Default::default()
        };
        svc.update(&alice, &created.id, patch).unwrap();

        let history = svc.history(&alice, &created.id).unwrap();
        let transitions: Vec<_> = history
            .iter()
            .map(|h| (h.old_status, h.new_status))
            .collect();
        assert_eq!(
            transitions,
            vec![
                (SponsorshipStatus::PitchReceived, SponsorshipStatus::Negotiating),
                (SponsorshipStatus::Negotiating, SponsorshipStatus::Approved),
            ]
        );
        assert!(history.iter().all(|h| h.changed_by == "alice"));
        assert!(matches!(
            svc.history(&identity("bob"), &created.id),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn test_delete_then_get_and_second_delete_are_not_found() {
        let (svc, _) = service();
        let alice = identity("alice");
        let created = svc.create(&alice, acme()).unwrap();

        svc.delete(&alice, &created.id).unwrap();
        assert!(matches!(svc.get(&alice, &created.id), Err(ApiError::NotFound)));
        assert!(matches!(svc.delete(&alice, &created.id), Err(ApiError::NotFound)));
        assert!(matches!(
            svc.update(&alice, &created.id, acme()),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn test_list_filters_by_status() {
        let (svc, _) = service();
        let alice = identity("alice");
        let first = svc.create(&alice, acme()).unwrap();
        svc.create(&alice, acme()).unwrap();
        let patch = SponsorshipInput {
            status: Some(SponsorshipStatus::Published),
            ..Default::default()
        };
        svc.update(&alice, &first.id, patch).unwrap();

        let (rows, total) = svc
            .list(&alice, Some(SponsorshipStatus::Published), 0, 20)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, first.id);

        let (_, total) = svc.list(&alice, None, 0, 20).unwrap();
        assert_eq!(total, 2);
    }
}
