use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::board::{DragEvent, PipelineStats, StageBoard, Transition, compute_transition};
use crate::export::{ExportDelivery, ExportError, ExportFile, build_export};
use crate::filter::{DealFilter, filter_deals};
use crate::model::{Company, Contact, Deal, DealId};
use crate::notify::{Notification, Notifier};
use crate::repository::{DealRepository, RepositoryError, RepositoryResult};
use crate::sort::{SortDirection, SortKey, sort_deals};
use crate::validate::{DealForm, ValidationErrors};

/// Everything that shapes the visible collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DealQuery {
    pub filter: DealFilter,
    pub sort_key: SortKey,
    pub direction: SortDirection,
}

impl DealQuery {
    /// Filter, then stable sort.
    pub fn apply(&self, deals: &[Deal]) -> Vec<Deal> {
        let mut visible = filter_deals(deals, &self.filter);
        sort_deals(&mut visible, self.sort_key, self.direction);
        visible
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum DragOutcome {
    /// Dropped back where it started, or outside the board.
    NoOp,
    Moved(Deal),
}

struct Derived {
    revision: u64,
    query: DealQuery,
    deals: Vec<Deal>,
}

/// State behind the deals page: loaded collections, the active query and the
/// pending delete confirmation. Every mutation goes through the repository and
/// local state only changes after the repository confirms. Each operation
/// reports its outcome as exactly one notification.
pub struct DealsView<R, N> {
    repo: R,
    notifier: N,
    deals: Vec<Deal>,
    contacts: Vec<Contact>,
    companies: Vec<Company>,
    query: DealQuery,
    revision: u64,
    derived: Option<Derived>,
    derivations: u64,
    pending_delete: Option<DealId>,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl<R: DealRepository, N: Notifier> DealsView<R, N> {
    pub fn new(repo: R, notifier: N) -> Self {
        Self {
            repo,
            notifier,
            deals: Vec::new(),
            contacts: Vec::new(),
            companies: Vec::new(),
            query: DealQuery::default(),
            revision: 0,
            derived: None,
            derivations: 0,
            pending_delete: None,
            today: local_today,
        }
    }

    /// Overrides the calendar used for close-date validation and export names.
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn query(&self) -> &DealQuery {
        &self.query
    }

    /// Number of times the visible collection was recomputed.
    pub fn derivations(&self) -> u64 {
        self.derivations
    }

    /// Loads deals from the repository alongside already-materialized lookups.
    pub async fn load(
        &mut self,
        contacts: Vec<Contact>,
        companies: Vec<Company>,
    ) -> RepositoryResult<()> {
        let span = info_span!("crm.deals.load");
        match self.repo.get_all().instrument(span).await {
            Ok(deals) => {
                info!(count = deals.len(), "deals loaded");
                self.deals = deals;
                self.contacts = contacts;
                self.companies = companies;
                self.touch();
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "loading deals failed");
                self.notifier
                    .notify(Notification::error("Failed to load deals data"));
                Err(err)
            }
        }
    }

    pub fn set_query(&mut self, query: DealQuery) {
        self.query = query;
    }

    pub fn set_filter(&mut self, filter: DealFilter) {
        self.query.filter = filter;
    }

    pub fn set_sort(&mut self, key: SortKey, direction: SortDirection) {
        self.query.sort_key = key;
        self.query.direction = direction;
    }

    /// Filtered and sorted deals, recomputed only when the deal collection or
    /// the query changed since the last call.
    pub fn visible(&mut self) -> &[Deal] {
        let stale = match &self.derived {
            Some(derived) => derived.revision != self.revision || derived.query != self.query,
            None => true,
        };
        if stale {
            self.derivations += 1;
            self.derived = Some(Derived {
                revision: self.revision,
                query: self.query.clone(),
                deals: self.query.apply(&self.deals),
            });
        }
        self.derived
            .as_ref()
            .map(|derived| derived.deals.as_slice())
            .unwrap_or_default()
    }

    pub fn board(&mut self) -> StageBoard {
        StageBoard::partition(self.visible())
    }

    /// Totals over every loaded deal, independent of the active filters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats::from_deals(&self.deals)
    }

    /// Applies a finished drag. The card only changes bucket once the
    /// repository has stored the new stage.
    pub async fn handle_drag(&mut self, event: DragEvent) -> RepositoryResult<DragOutcome> {
        let (deal_id, to) = match compute_transition(&event) {
            Transition::NoOp => {
                debug!(deal_id = event.deal_id, "drop without stage change ignored");
                return Ok(DragOutcome::NoOp);
            }
            Transition::Move { deal_id, to } => (deal_id, to),
        };

        let span = info_span!(
            "crm.deals.moveStage",
            deal_id,
            from = event.source.as_str(),
            to = to.as_str()
        );
        match self.repo.update_stage(deal_id, to).instrument(span).await {
            Ok(updated) => {
                info!(deal_id, stage = %updated.stage, "deal stage updated");
                self.replace_local(updated.clone());
                self.notifier
                    .notify(Notification::success(format!("Deal moved to {}", to)));
                Ok(DragOutcome::Moved(updated))
            }
            Err(err) => {
                warn!(deal_id, error = %err, "deal stage update failed");
                self.notifier
                    .notify(Notification::error("Failed to update deal stage"));
                Err(err)
            }
        }
    }

    /// Validates and stores a deal form; `editing` selects update over create.
    pub async fn submit(
        &mut self,
        form: &DealForm,
        editing: Option<DealId>,
    ) -> Result<Deal, SubmitError> {
        let payload = match form.validate((self.today)()) {
            Ok(payload) => payload,
            Err(errors) => {
                debug!(fields = errors.len(), "deal form rejected");
                self.notifier.notify(Notification::error(
                    "Please fix the errors before submitting",
                ));
                return Err(errors.into());
            }
        };

        let result = match editing {
            Some(id) => {
                let span = info_span!("crm.deals.update", deal_id = id);
                self.repo.update(id, payload).instrument(span).await
            }
            None => {
                let span = info_span!("crm.deals.create");
                self.repo.create(payload).instrument(span).await
            }
        };

        match (result, editing) {
            (Ok(deal), Some(_)) => {
                info!(deal_id = deal.id, "deal updated");
                self.replace_local(deal.clone());
                self.notifier.notify(Notification::success(format!(
                    "Deal \"{}\" updated successfully!",
                    deal.name
                )));
                Ok(deal)
            }
            (Ok(deal), None) => {
                info!(deal_id = deal.id, "deal created");
                self.deals.insert(0, deal.clone());
                self.touch();
                self.notifier.notify(Notification::success(format!(
                    "Deal \"{}\" created successfully!",
                    deal.name
                )));
                Ok(deal)
            }
            (Err(err), editing) => {
                let verb = if editing.is_some() { "update" } else { "create" };
                warn!(error = %err, "deal {verb} failed");
                self.notifier
                    .notify(Notification::error(format!("Failed to {verb} deal")));
                Err(err.into())
            }
        }
    }

    /// First half of a delete: remembers the deal awaiting confirmation and
    /// returns it for the prompt. Unknown ids leave nothing pending.
    pub fn request_delete(&mut self, id: DealId) -> Option<&Deal> {
        let deal = self.deals.iter().find(|deal| deal.id == id)?;
        self.pending_delete = Some(id);
        Some(deal)
    }

    pub fn pending_delete(&self) -> Option<DealId> {
        self.pending_delete
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Deletes the deal awaiting confirmation. Returns `Ok(false)` when nothing
    /// was pending or the repository had nothing to delete.
    pub async fn confirm_delete(&mut self) -> RepositoryResult<bool> {
        let Some(id) = self.pending_delete else {
            return Ok(false);
        };

        let span = info_span!("crm.deals.delete", deal_id = id);
        match self.repo.delete(id).instrument(span).await {
            Ok(true) => {
                info!(deal_id = id, "deal deleted");
                let name = self
                    .deals
                    .iter()
                    .find(|deal| deal.id == id)
                    .map(|deal| deal.name.clone())
                    .unwrap_or_default();
                self.deals.retain(|deal| deal.id != id);
                self.pending_delete = None;
                self.touch();
                self.notifier.notify(Notification::success(format!(
                    "Deal \"{}\" deleted successfully!",
                    name
                )));
                Ok(true)
            }
            Ok(false) => {
                warn!(deal_id = id, "deal to delete was already gone");
                self.notifier
                    .notify(Notification::error("Failed to delete deal"));
                Ok(false)
            }
            Err(err) => {
                warn!(deal_id = id, error = %err, "deal delete failed");
                self.notifier
                    .notify(Notification::error("Failed to delete deal"));
                Err(err)
            }
        }
    }

    /// Exports the currently visible deals, in display order.
    pub async fn export<D: ExportDelivery>(
        &mut self,
        delivery: &D,
    ) -> Result<ExportFile, ExportError> {
        let today = (self.today)();
        let visible = self.visible().to_vec();
        let span = info_span!("crm.deals.export", count = visible.len());
        let result = async {
            let file = build_export(&visible, &self.contacts, &self.companies, today)?;
            delivery.deliver(&file).await?;
            Ok::<_, ExportError>(file)
        }
        .instrument(span)
        .await;

        match result {
            Ok(file) => {
                self.notifier.notify(Notification::success(format!(
                    "{} deals exported successfully!",
                    visible.len()
                )));
                Ok(file)
            }
            Err(err) => {
                warn!(error = %err, "deal export failed");
                self.notifier
                    .notify(Notification::error("Failed to export deals"));
                Err(err)
            }
        }
    }

    fn replace_local(&mut self, updated: Deal) {
        if let Some(slot) = self.deals.iter_mut().find(|deal| deal.id == updated.id) {
            *slot = updated;
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}
