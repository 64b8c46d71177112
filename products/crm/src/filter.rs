use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::model::{Deal, Stage};

/// Compound deal query. Every populated field is one predicate; a deal must
/// satisfy all of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DealFilter {
    pub query: String,
    pub stage: Option<Stage>,
    /// Company identity as the UI holds it (a string), matched against the
    /// string form of the deal's company reference.
    pub company: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
}

impl DealFilter {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_created_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search_term().is_none()
            && self.stage.is_none()
            && self.company_key().is_none()
            && self.created_from.is_none()
            && self.created_to.is_none()
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        let needle = self.search_term();
        self.matches_prepared(deal, needle.as_deref())
    }

    fn matches_prepared(&self, deal: &Deal, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            let in_name = deal.name.to_lowercase().contains(needle);
            let in_notes = deal
                .notes
                .as_deref()
                .map(|notes| notes.to_lowercase().contains(needle))
                .unwrap_or(false);
            if !in_name && !in_notes {
                return false;
            }
        }

        if let Some(stage) = self.stage {
            if deal.stage != stage {
                return false;
            }
        }

        if let Some(company) = self.company_key() {
            if deal.company_id.filter_key().as_deref() != Some(company) {
                return false;
            }
        }

        if let Some(start) = self.created_from.map(start_of_day) {
            if deal.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.created_to.map(end_of_day) {
            if deal.created_at > end {
                return false;
            }
        }

        true
    }

    fn search_term(&self) -> Option<String> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    fn company_key(&self) -> Option<&str> {
        self.company
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(end).and_utc()
}

/// Deals matching `filter`, in input order. The input is left untouched.
pub fn filter_deals(deals: &[Deal], filter: &DealFilter) -> Vec<Deal> {
    if filter.is_empty() {
        return deals.to_vec();
    }
    let needle = filter.search_term();
    deals
        .iter()
        .filter(|deal| filter.matches_prepared(deal, needle.as_deref()))
        .cloned()
        .collect()
}
