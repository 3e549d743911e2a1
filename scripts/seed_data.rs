//! Seed script for Sponsor Tracker
//!
//! Creates a demo creator account and a handful of deals spread across the
//! pipeline, so the dashboard and listings have something to show.
//! Run: cargo run --bin seed_data   (honours DATA_DIR / BCRYPT_COST)
//! Login afterwards with demo@sponsor.test / demo1234.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sponsor_tracker::auth::hash_password;
use sponsor_tracker::config::Config;
use sponsor_tracker::error::StoreError;
use sponsor_tracker::models::{Identity, Priority, SponsorshipInput, SponsorshipStatus, User};
use sponsor_tracker::sponsorships::SponsorshipService;
use sponsor_tracker::storage::Storage;
use uuid::Uuid;

const DEMO_EMAIL: &str = "demo@sponsor.test";
const DEMO_PASSWORD: &str = "demo1234";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let storage = Storage::open(&config.data_dir)?;

    let now = Utc::now();
    let candidate = User {
        id: Uuid::new_v4().to_string(),
        username: "demo".to_string(),
        email: DEMO_EMAIL.to_string(),
        password_hash: hash_password(DEMO_PASSWORD, config.bcrypt_cost)?,
        created_at: now,
        updated_at: now,
    };
    let user = match storage.create_user(&candidate) {
        Ok(()) => {
            println!("✅ Created demo user {DEMO_EMAIL}");
            candidate
        }
        Err(StoreError::DuplicateEmail) => {
            println!("ℹ️  Demo user already exists, adding deals to it");
            storage
                .get_user_by_email(DEMO_EMAIL)?
                .ok_or("demo user vanished after conflict")?
        }
        Err(e) => return Err(e.into()),
    };

    let identity = Identity {
        user_id: user.id.clone(),
        email: user.email.clone(),
        creator_id: user.id.clone(),
    };
    let service = SponsorshipService::new(Arc::new(storage.clone()));

    let deals = [
        ("Acme Audio", "Wireless earbuds", 1500.0, Priority::High, SponsorshipStatus::Negotiating),
        ("Northwind Coffee", "Cold brew", 800.0, Priority::Medium, SponsorshipStatus::PitchReceived),
        ("Globex VPN", "VPN subscription", 2500.0, Priority::High, SponsorshipStatus::Contracted),
        ("Initech Desks", "Standing desk", 1200.0, Priority::Low, SponsorshipStatus::Approved),
        ("Umbrella Fitness", "Protein bars", 600.0, Priority::Medium, SponsorshipStatus::Published),
        ("Hooli Cloud", "Photo backup", 3000.0, Priority::Low, SponsorshipStatus::Completed),
    ];

    for (i, (brand, product, amount, priority, status)) in deals.into_iter().enumerate() {
        let domain = brand.split(' ').next().unwrap_or("brand").to_lowercase();
        let created = service.create(
            &identity,
            SponsorshipInput {
                brand_name: brand.to_string(),
                product_service: product.to_string(),
                deal_amount: amount,
                priority: Some(priority),
                contact_email: format!("partners@{domain}.test"),
                deliverables: vec!["1 dedicated video".to_string(), "2 stories".to_string()],
                start_date: Some(now + Duration::days(7 * i as i64)),
                end_date: Some(now + Duration::days(7 * i as i64 + 30)),
                ..Default::default()
            },
        )?;

        if status != SponsorshipStatus::PitchReceived {
            service.update(
                &identity,
                &created.id,
                SponsorshipInput {
                    status: Some(status),
                    ..Default::default()
                },
            )?;
        }
    }
    println!("✅ Loaded {} demo sponsorships", deals.len());

    let stats = sponsor_tracker::dashboard::compute_stats(&storage, &identity.creator_id)?;
    println!(
        "✅ Dashboard: {} active, {} pending approval, {} completed, pipeline ${:.2}",
        stats.active_deals, stats.pending_approval, stats.completed_deals, stats.pipeline_value
    );

    storage.flush().await?;
    Ok(())
}
