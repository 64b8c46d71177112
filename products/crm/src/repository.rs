use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::board::PipelineStats;
use crate::model::{CompanyId, ContactId, Deal, DealId, DealPayload, Stage};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    #[error("deal {0} not found")]
    NotFound(DealId),
    #[error("invalid deal id {0:?}")]
    InvalidId(String),
    #[error("persistence failure: {0}")]
    Backend(Arc<anyhow::Error>),
}

impl RepositoryError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(Arc::new(err.into()))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

/// Parses a deal id received as text (route segment, drag identifier, CLI arg).
pub fn parse_deal_id(raw: &str) -> RepositoryResult<DealId> {
    raw.trim()
        .parse::<DealId>()
        .map_err(|_| RepositoryError::InvalidId(raw.to_string()))
}

/// Persistence boundary for deals.
#[async_trait]
pub trait DealRepository: Send + Sync {
    async fn get_all(&self) -> RepositoryResult<Vec<Deal>>;

    async fn get_by_id(&self, id: DealId) -> RepositoryResult<Deal>;

    /// Stores a new deal; the repository assigns `id`, `created_at` and `updated_at`.
    async fn create(&self, payload: DealPayload) -> RepositoryResult<Deal>;

    /// Replaces the editable fields. `id` and `created_at` are preserved.
    async fn update(&self, id: DealId, payload: DealPayload) -> RepositoryResult<Deal>;

    async fn update_stage(&self, id: DealId, stage: Stage) -> RepositoryResult<Deal>;

    /// `false` when there was nothing to delete.
    async fn delete(&self, id: DealId) -> RepositoryResult<bool>;

    async fn get_by_stage(&self, stage: Stage) -> RepositoryResult<Vec<Deal>> {
        let deals = self.get_all().await?;
        Ok(deals.into_iter().filter(|deal| deal.stage == stage).collect())
    }

    async fn get_by_company(&self, company_id: CompanyId) -> RepositoryResult<Vec<Deal>> {
        let deals = self.get_all().await?;
        Ok(deals
            .into_iter()
            .filter(|deal| deal.company_id.id() == Some(company_id))
            .collect())
    }

    async fn get_by_contact(&self, contact_id: ContactId) -> RepositoryResult<Vec<Deal>> {
        let deals = self.get_all().await?;
        Ok(deals
            .into_iter()
            .filter(|deal| deal.contact_id == Some(contact_id))
            .collect())
    }

    async fn stats(&self) -> RepositoryResult<PipelineStats> {
        let deals = self.get_all().await?;
        Ok(PipelineStats::from_deals(&deals))
    }
}

#[async_trait]
impl<R: DealRepository + ?Sized> DealRepository for &R {
    async fn get_all(&self) -> RepositoryResult<Vec<Deal>> {
        (**self).get_all().await
    }

    async fn get_by_id(&self, id: DealId) -> RepositoryResult<Deal> {
        (**self).get_by_id(id).await
    }

    async fn create(&self, payload: DealPayload) -> RepositoryResult<Deal> {
        (**self).create(payload).await
    }

    async fn update(&self, id: DealId, payload: DealPayload) -> RepositoryResult<Deal> {
        (**self).update(id, payload).await
    }

    async fn update_stage(&self, id: DealId, stage: Stage) -> RepositoryResult<Deal> {
        (**self).update_stage(id, stage).await
    }

    async fn delete(&self, id: DealId) -> RepositoryResult<bool> {
        (**self).delete(id).await
    }

    async fn get_by_stage(&self, stage: Stage) -> RepositoryResult<Vec<Deal>> {
        (**self).get_by_stage(stage).await
    }

    async fn get_by_company(&self, company_id: CompanyId) -> RepositoryResult<Vec<Deal>> {
        (**self).get_by_company(company_id).await
    }

    async fn get_by_contact(&self, contact_id: ContactId) -> RepositoryResult<Vec<Deal>> {
        (**self).get_by_contact(contact_id).await
    }

    async fn stats(&self) -> RepositoryResult<PipelineStats> {
        (**self).stats().await
    }
}

#[derive(Debug, Default)]
struct Store {
    deals: BTreeMap<DealId, Deal>,
    next_id: DealId,
}

/// Process-local repository: an id-indexed map and a monotonic id counter.
/// Each instance is isolated, so tests build their own.
#[derive(Debug, Default)]
pub struct InMemoryDealRepository {
    store: RwLock<Store>,
}

impl InMemoryDealRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds existing records; new ids continue after the highest seeded id.
    pub fn with_deals(deals: impl IntoIterator<Item = Deal>) -> Self {
        let deals: BTreeMap<DealId, Deal> = deals.into_iter().map(|deal| (deal.id, deal)).collect();
        let next_id = deals.keys().next_back().map(|id| id + 1).unwrap_or(1);
        Self {
            store: RwLock::new(Store { deals, next_id }),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.deals.len()
    }
}

#[async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<Deal>> {
        Ok(self.store.read().await.deals.values().cloned().collect())
    }

    async fn get_by_id(&self, id: DealId) -> RepositoryResult<Deal> {
        self.store
            .read()
            .await
            .deals
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn create(&self, payload: DealPayload) -> RepositoryResult<Deal> {
        let mut store = self.store.write().await;
        let id = store.next_id.max(1);
        store.next_id = id + 1;
        let deal = payload.into_deal(id, Utc::now());
        store.deals.insert(id, deal.clone());
        Ok(deal)
    }

    async fn update(&self, id: DealId, payload: DealPayload) -> RepositoryResult<Deal> {
        let mut store = self.store.write().await;
        let deal = store
            .deals
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        deal.apply(payload, Utc::now());
        Ok(deal.clone())
    }

    async fn update_stage(&self, id: DealId, stage: Stage) -> RepositoryResult<Deal> {
        let mut store = self.store.write().await;
        let deal = store
            .deals
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        deal.stage = stage;
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }

    async fn delete(&self, id: DealId) -> RepositoryResult<bool> {
        Ok(self.store.write().await.deals.remove(&id).is_some())
    }
}
