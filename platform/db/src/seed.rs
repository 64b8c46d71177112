use chrono::{Duration, NaiveDate, Utc};
use entity::{company, contact, deal};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, PaginatorTrait, Set,
    TransactionTrait,
};
use tracing::info;

/// Row counts written by [`seed_pipeline_demo`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SeedReport {
    pub companies: usize,
    pub contacts: usize,
    pub deals: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.companies == 0 && self.contacts == 0 && self.deals == 0
    }
}

const COMPANIES: &[&str] = &["Acme Corp", "Globex", "Initech"];

// (name, email, company index)
const CONTACTS: &[(&str, &str, usize)] = &[
    ("Ada Lovelace", "ada@acme.test", 0),
    ("Grace Hopper", "grace@globex.test", 1),
    ("Alan Turing", "alan@globex.test", 1),
    ("Peter Gibbons", "peter@initech.test", 2),
];

// (name, value, stage, days until close, contact index, company index)
const DEALS: &[(&str, f64, deal::Stage, i64, usize, Option<usize>)] = &[
    ("Acme platform rollout", 45000.0, deal::Stage::Prospecting, 60, 0, Some(0)),
    ("Acme support renewal", 12000.0, deal::Stage::Proposal, 30, 0, Some(0)),
    ("Globex data migration", 78000.0, deal::Stage::Negotiation, 21, 1, Some(1)),
    ("Globex analytics pilot", 9500.0, deal::Stage::ClosedWon, -7, 2, Some(1)),
    ("Initech TPS automation", 23000.0, deal::Stage::ClosedLost, -14, 3, Some(2)),
    ("Referral consulting", 4000.0, deal::Stage::Prospecting, 90, 3, None),
];

/// Inserts demo companies, contacts and deals in one transaction. Does
/// nothing when deals already exist.
pub async fn seed_pipeline_demo(db: &DatabaseConnection) -> Result<SeedReport, DbErr> {
    let existing = deal::Entity::find().count(db).await?;
    if existing > 0 {
        info!(existing, "deals present; skipping demo seed");
        return Ok(SeedReport::default());
    }

    let now: DateTimeWithTimeZone = Utc::now().into();
    let today: NaiveDate = Utc::now().date_naive();
    let txn = db.begin().await?;

    let mut company_ids = Vec::with_capacity(COMPANIES.len());
    for name in COMPANIES {
        let model = company::ActiveModel {
            id: NotSet,
            name: Set((*name).to_string()),
        }
        .insert(&txn)
        .await?;
        company_ids.push(model.id);
    }

    let mut contact_ids = Vec::with_capacity(CONTACTS.len());
    for (name, email, company) in CONTACTS {
        let model = contact::ActiveModel {
            id: NotSet,
            name: Set((*name).to_string()),
            email: Set(Some((*email).to_string())),
            company_id: Set(company_ids.get(*company).copied()),
        }
        .insert(&txn)
        .await?;
        contact_ids.push(model.id);
    }

    for (name, value, stage, close_in_days, contact, company) in DEALS {
        deal::ActiveModel {
            id: NotSet,
            name: Set((*name).to_string()),
            value: Set(*value),
            stage: Set(*stage),
            expected_close_date: Set(today + Duration::days(*close_in_days)),
            contact_id: Set(contact_ids.get(*contact).copied()),
            company_id: Set(company.and_then(|idx| company_ids.get(idx).copied())),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    let report = SeedReport {
        companies: company_ids.len(),
        contacts: contact_ids.len(),
        deals: DEALS.len(),
    };
    info!(?report, "demo pipeline seeded");
    Ok(report)
}
