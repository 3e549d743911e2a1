use tracing::instrument;

use crate::error::StoreError;
use crate::models::{DashboardStats, Sponsorship, SponsorshipStatus};
use crate::storage::Storage;

/// Upper bound on deals pulled for one dashboard computation.
pub const STATS_SCAN_LIMIT: usize = 10_000;

/// Recompute a creator's stats from their active deals. Nothing is cached.
#[instrument(skip(storage))]
pub fn compute_stats(storage: &Storage, creator_id: &str) -> Result<DashboardStats, StoreError> {
    let (sponsorships, _) = storage.list_sponsorships(creator_id, None, 0, STATS_SCAN_LIMIT)?;
    Ok(summarize(&sponsorships))
}

/// `average_deal_amount` is the pipeline value spread over *all* deals,
/// completed ones included.
pub fn summarize(sponsorships: &[Sponsorship]) -> DashboardStats {
    let mut stats = DashboardStats::default();
    for s in sponsorships {
        match s.status {
            SponsorshipStatus::Completed => stats.completed_deals += 1,
            status => {
                stats.active_deals += 1;
                stats.pipeline_value += s.deal_amount;
                if matches!(
                    status,
                    SponsorshipStatus::Negotiating | SponsorshipStatus::Approved
                ) {
                    stats.pending_approval += 1;
                }
            }
        }
    }

    if !sponsorships.is_empty() {
        stats.average_deal_amount = stats.pipeline_value / sponsorships.len() as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn deal(id: &str, amount: f64, status: SponsorshipStatus) -> Sponsorship {
        let now = Utc::now();
        Sponsorship {
            id: id.into(),
            creator_id: "alice".into(),
            brand_name: "Brand".into(),
            product_service: String::new(),
            deal_amount: amount,
            priority: None,
            contact_name: String::new(),
            contact_email: String::new(),
            contact_phone: String::new(),
            description: String::new(),
            deliverables: vec![],
            target_audience: String::new(),
            start_date: None,
            end_date: None,
            status,
            notes: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_empty_set_is_all_zero() {
        assert_eq!(summarize(&[]), DashboardStats::default());
    }

    #[test]
    fn test_summary_counts() {
        let deals = vec![
            deal("a", 1000.0, SponsorshipStatus::Negotiating),
            deal("b", 500.0, SponsorshipStatus::Approved),
            deal("c", 250.0, SponsorshipStatus::Contracted),
            deal("d", 4000.0, SponsorshipStatus::Completed),
        ];
        let stats = summarize(&deals);

        assert_eq!(stats.active_deals, 3);
        assert_eq!(stats.completed_deals, 1);
        assert_eq!(stats.pending_approval, 2);
        assert_eq!(stats.pipeline_value, 1750.0);
        // 1750 over all four deals.
        assert_eq!(stats.average_deal_amount, 437.5);
    }

    #[test]
    fn test_compute_stats_skips_deleted_and_foreign_deals() {
        let storage = Storage::temporary().unwrap();
        storage
            .insert_sponsorship(&deal("a", 100.0, SponsorshipStatus::PitchReceived))
            .unwrap();
        storage
            .insert_sponsorship(&deal("b", 300.0, SponsorshipStatus::UnderReview))
            .unwrap();
        let mut foreign = deal("c", 900.0, SponsorshipStatus::PitchReceived);
        foreign.creator_id = "bob".into();
        storage.insert_sponsorship(&foreign).unwrap();
        storage
            .soft_delete_sponsorship("alice", "b", Utc::now())
            .unwrap();

        let stats = compute_stats(&storage, "alice").unwrap();
        assert_eq!(stats.active_deals, 1);
        assert_eq!(stats.pipeline_value, 100.0);
        assert_eq!(stats.average_deal_amount, 100.0);
    }
}
