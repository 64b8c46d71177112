use async_trait::async_trait;
use chrono::Utc;
use entity::{company, contact, deal};
use products_crm::{
    Company, CompanyId, Contact, ContactId, Deal, DealId, DealPayload, DealRepository,
    RepositoryError, RepositoryResult, Stage,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, NotSet,
    QueryFilter, QueryOrder, Set,
};
use tracing::debug;

pub fn stage_to_db(stage: Stage) -> deal::Stage {
    match stage {
        Stage::Prospecting => deal::Stage::Prospecting,
        Stage::Proposal => deal::Stage::Proposal,
        Stage::Negotiation => deal::Stage::Negotiation,
        Stage::ClosedWon => deal::Stage::ClosedWon,
        Stage::ClosedLost => deal::Stage::ClosedLost,
    }
}

pub fn stage_from_db(stage: deal::Stage) -> Stage {
    match stage {
        deal::Stage::Prospecting => Stage::Prospecting,
        deal::Stage::Proposal => Stage::Proposal,
        deal::Stage::Negotiation => Stage::Negotiation,
        deal::Stage::ClosedWon => Stage::ClosedWon,
        deal::Stage::ClosedLost => Stage::ClosedLost,
    }
}

fn deal_from_model(model: deal::Model) -> Deal {
    Deal {
        id: model.id,
        name: model.name,
        value: if model.value.is_finite() { model.value } else { 0.0 },
        stage: stage_from_db(model.stage),
        expected_close_date: model.expected_close_date,
        contact_id: model.contact_id,
        company_id: model.company_id.into(),
        notes: model.notes,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn write_payload(active: &mut deal::ActiveModel, payload: DealPayload, now: DateTimeWithTimeZone) {
    active.name = Set(payload.name);
    active.value = Set(payload.value);
    active.stage = Set(stage_to_db(payload.stage));
    active.expected_close_date = Set(payload.expected_close_date);
    active.contact_id = Set(Some(payload.contact_id));
    active.company_id = Set(payload.company_id);
    active.notes = Set(payload.notes);
    active.updated_at = Set(now);
}

/// [`DealRepository`] over a SeaORM connection.
#[derive(Clone, Debug)]
pub struct SeaDealRepository {
    db: DatabaseConnection,
}

impl SeaDealRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn find_model(&self, id: DealId) -> RepositoryResult<deal::Model> {
        deal::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(RepositoryError::backend)?
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn find_where(
        &self,
        condition: impl sea_orm::sea_query::IntoCondition,
    ) -> RepositoryResult<Vec<Deal>> {
        let rows = deal::Entity::find()
            .filter(condition)
            .order_by_asc(deal::Column::Id)
            .all(&self.db)
            .await
            .map_err(RepositoryError::backend)?;
        Ok(rows.into_iter().map(deal_from_model).collect())
    }
}

#[async_trait]
impl DealRepository for SeaDealRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<Deal>> {
        let rows = deal::Entity::find()
            .order_by_asc(deal::Column::Id)
            .all(&self.db)
            .await
            .map_err(RepositoryError::backend)?;
        debug!(count = rows.len(), "deal rows fetched");
        Ok(rows.into_iter().map(deal_from_model).collect())
    }

    async fn get_by_id(&self, id: DealId) -> RepositoryResult<Deal> {
        self.find_model(id).await.map(deal_from_model)
    }

    async fn create(&self, payload: DealPayload) -> RepositoryResult<Deal> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let mut active = deal::ActiveModel {
            id: NotSet,
            created_at: Set(now),
            ..Default::default()
        };
        write_payload(&mut active, payload, now);
        let model = active
            .insert(&self.db)
            .await
            .map_err(RepositoryError::backend)?;
        Ok(deal_from_model(model))
    }

    async fn update(&self, id: DealId, payload: DealPayload) -> RepositoryResult<Deal> {
        let mut active = self.find_model(id).await?.into_active_model();
        let now: DateTimeWithTimeZone = Utc::now().into();
        write_payload(&mut active, payload, now);
        let model = active
            .update(&self.db)
            .await
            .map_err(RepositoryError::backend)?;
        Ok(deal_from_model(model))
    }

    async fn update_stage(&self, id: DealId, stage: Stage) -> RepositoryResult<Deal> {
        let mut active = self.find_model(id).await?.into_active_model();
        let now: DateTimeWithTimeZone = Utc::now().into();
        active.stage = Set(stage_to_db(stage));
        active.updated_at = Set(now);
        let model = active
            .update(&self.db)
            .await
            .map_err(RepositoryError::backend)?;
        Ok(deal_from_model(model))
    }

    async fn delete(&self, id: DealId) -> RepositoryResult<bool> {
        let res = deal::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(RepositoryError::backend)?;
        Ok(res.rows_affected > 0)
    }

    async fn get_by_stage(&self, stage: Stage) -> RepositoryResult<Vec<Deal>> {
        self.find_where(deal::Column::Stage.eq(stage_to_db(stage)))
            .await
    }

    async fn get_by_company(&self, company_id: CompanyId) -> RepositoryResult<Vec<Deal>> {
        self.find_where(deal::Column::CompanyId.eq(company_id)).await
    }

    async fn get_by_contact(&self, contact_id: ContactId) -> RepositoryResult<Vec<Deal>> {
        self.find_where(deal::Column::ContactId.eq(contact_id)).await
    }
}

pub async fn load_contacts(db: &DatabaseConnection) -> RepositoryResult<Vec<Contact>> {
    let rows = contact::Entity::find()
        .order_by_asc(contact::Column::Name)
        .all(db)
        .await
        .map_err(RepositoryError::backend)?;
    Ok(rows
        .into_iter()
        .map(|row| Contact {
            id: row.id,
            name: row.name,
            email: row.email,
            company_id: row.company_id,
        })
        .collect())
}

pub async fn load_companies(db: &DatabaseConnection) -> RepositoryResult<Vec<Company>> {
    let rows = company::Entity::find()
        .order_by_asc(company::Column::Name)
        .all(db)
        .await
        .map_err(RepositoryError::backend)?;
    Ok(rows
        .into_iter()
        .map(|row| Company {
            id: row.id,
            name: row.name,
        })
        .collect())
}
