use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::Deal;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SortKey {
    Name,
    Value,
    Stage,
    ExpectedCloseDate,
    #[default]
    CreatedAt,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Value => "value",
            SortKey::Stage => "stage",
            SortKey::ExpectedCloseDate => "expectedCloseDate",
            SortKey::CreatedAt => "createdAt",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SortParseError {
    #[error("unknown sort key {0:?}")]
    Key(String),
    #[error("unknown sort direction {0:?}")]
    Direction(String),
}

impl FromStr for SortKey {
    type Err = SortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(SortKey::Name),
            "value" => Ok(SortKey::Value),
            "stage" => Ok(SortKey::Stage),
            "expectedCloseDate" | "expected-close-date" => Ok(SortKey::ExpectedCloseDate),
            "createdAt" | "created-at" => Ok(SortKey::CreatedAt),
            other => Err(SortParseError::Key(other.to_string())),
        }
    }
}

impl FromStr for SortDirection {
    type Err = SortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(SortParseError::Direction(s.to_string())),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-aware comparison of two deals on `key`, always ascending.
pub fn compare_by(key: SortKey, a: &Deal, b: &Deal) -> Ordering {
    match key {
        SortKey::Value => amount(a.value).total_cmp(&amount(b.value)),
        SortKey::ExpectedCloseDate => a.expected_close_date.cmp(&b.expected_close_date),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Stage => a
            .stage
            .as_str()
            .to_lowercase()
            .cmp(&b.stage.as_str().to_lowercase()),
    }
}

fn amount(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Sorts in place. The sort is stable for both directions, so deals with equal
/// keys keep their relative order.
pub fn sort_deals(deals: &mut [Deal], key: SortKey, direction: SortDirection) {
    deals.sort_by(|a, b| {
        let ordering = compare_by(key, a, b);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

pub fn sorted(mut deals: Vec<Deal>, key: SortKey, direction: SortDirection) -> Vec<Deal> {
    sort_deals(&mut deals, key, direction);
    deals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompanyRef, Stage};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn deal(id: i64, name: &str, value: f64, stage: Stage) -> Deal {
        let created = Utc.with_ymd_and_hms(2025, 1, id as u32, 12, 0, 0).unwrap();
        Deal {
            id,
            name: name.into(),
            value,
            stage,
            expected_close_date: NaiveDate::from_ymd_opt(2030, 1, 31 - id as u32).unwrap(),
            contact_id: Some(1),
            company_id: CompanyRef::Unresolved,
            notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn ids(deals: &[Deal]) -> Vec<i64> {
        deals.iter().map(|d| d.id).collect()
    }

    #[test]
    fn value_sorts_numerically() {
        let deals = vec![
            deal(1, "a", 100.0, Stage::Proposal),
            deal(2, "b", 9.0, Stage::Proposal),
            deal(3, "c", 20.0, Stage::Proposal),
        ];
        let asc = sorted(deals, SortKey::Value, SortDirection::Ascending);
        assert_eq!(ids(&asc), vec![2, 3, 1]);
    }

    #[test]
    fn non_finite_values_sort_as_zero() {
        let deals = vec![
            deal(1, "a", 5.0, Stage::Proposal),
            deal(2, "b", f64::NAN, Stage::Proposal),
            deal(3, "c", -1.0, Stage::Proposal),
        ];
        let asc = sorted(deals, SortKey::Value, SortDirection::Ascending);
        assert_eq!(ids(&asc), vec![3, 2, 1]);
    }

    #[test]
    fn names_compare_case_insensitively() {
        let deals = vec![
            deal(1, "beta", 1.0, Stage::Proposal),
            deal(2, "Alpha", 1.0, Stage::Proposal),
            deal(3, "Gamma", 1.0, Stage::Proposal),
        ];
        let asc = sorted(deals, SortKey::Name, SortDirection::Ascending);
        assert_eq!(ids(&asc), vec![2, 1, 3]);
    }

    #[test]
    fn stage_sorts_by_label_text() {
        let deals = vec![
            deal(1, "a", 1.0, Stage::Prospecting),
            deal(2, "b", 1.0, Stage::ClosedWon),
            deal(3, "c", 1.0, Stage::Negotiation),
            deal(4, "d", 1.0, Stage::ClosedLost),
        ];
        let asc = sorted(deals, SortKey::Stage, SortDirection::Ascending);
        assert_eq!(ids(&asc), vec![4, 2, 3, 1]);
    }

    #[test]
    fn dates_sort_chronologically() {
        let deals = vec![
            deal(2, "a", 1.0, Stage::Proposal),
            deal(1, "b", 1.0, Stage::Proposal),
            deal(3, "c", 1.0, Stage::Proposal),
        ];
        let created = sorted(deals.clone(), SortKey::CreatedAt, SortDirection::Descending);
        assert_eq!(ids(&created), vec![3, 2, 1]);
        let closing = sorted(deals, SortKey::ExpectedCloseDate, SortDirection::Ascending);
        assert_eq!(ids(&closing), vec![3, 2, 1]);
    }

    #[test]
    fn equal_keys_keep_input_order_in_both_directions() {
        let deals = vec![
            deal(1, "same", 1.0, Stage::Proposal),
            deal(2, "Same", 1.0, Stage::Proposal),
            deal(3, "SAME", 1.0, Stage::Proposal),
        ];
        let asc = sorted(deals.clone(), SortKey::Name, SortDirection::Ascending);
        let desc = sorted(deals, SortKey::Name, SortDirection::Descending);
        assert_eq!(ids(&asc), vec![1, 2, 3]);
        assert_eq!(ids(&desc), vec![1, 2, 3]);
    }

    #[test]
    fn wire_names_parse() {
        assert_eq!("expectedCloseDate".parse::<SortKey>().unwrap(), SortKey::ExpectedCloseDate);
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Descending);
        assert!("price".parse::<SortKey>().is_err());
    }
}
