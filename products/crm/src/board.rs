use serde::Serialize;
use thiserror::Error;

use crate::model::{Deal, DealId, Stage};

/// One board column: every deal currently in `stage`, in engine order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBucket {
    pub stage: Stage,
    pub deals: Vec<Deal>,
}

impl StageBucket {
    pub fn total_count(&self) -> usize {
        self.deals.len()
    }

    pub fn total_value(&self) -> f64 {
        self.deals.iter().map(|deal| deal.value).sum()
    }
}

/// The five stage buckets in display order. Every deal handed to
/// [`StageBoard::partition`] lands in exactly one bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageBoard {
    buckets: [StageBucket; 5],
}

impl StageBoard {
    pub fn partition(deals: &[Deal]) -> Self {
        let mut buckets = Stage::ALL.map(|stage| StageBucket {
            stage,
            deals: Vec::new(),
        });
        for deal in deals {
            buckets[deal.stage.position()].deals.push(deal.clone());
        }
        Self { buckets }
    }

    pub fn buckets(&self) -> &[StageBucket] {
        &self.buckets
    }

    pub fn bucket(&self, stage: Stage) -> &StageBucket {
        &self.buckets[stage.position()]
    }

    pub fn total_count(&self) -> usize {
        self.buckets.iter().map(StageBucket::total_count).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.buckets.iter().map(StageBucket::total_value).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// Bucket currently holding `deal_id`, if the deal is on the board.
    pub fn locate(&self, deal_id: DealId) -> Option<Stage> {
        self.buckets
            .iter()
            .find(|bucket| bucket.deals.iter().any(|deal| deal.id == deal_id))
            .map(|bucket| bucket.stage)
    }
}

/// A finished drag as reported by the board: where the card came from, where it
/// was dropped (`None` when released outside every column) and which deal it was.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DragEvent {
    pub source: Stage,
    pub destination: Option<Stage>,
    pub deal_id: DealId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DragError {
    #[error("unknown bucket {0:?}")]
    UnknownBucket(String),
    #[error("invalid deal id {0:?}")]
    InvalidDealId(String),
}

impl DragEvent {
    pub fn new(source: Stage, destination: Stage, deal_id: DealId) -> Self {
        Self {
            source,
            destination: Some(destination),
            deal_id,
        }
    }

    /// Builds an event from the drag library's string identifiers: bucket ids
    /// are stage labels and the draggable id is the deal id as text.
    pub fn from_identifiers(
        source: &str,
        destination: Option<&str>,
        draggable_id: &str,
    ) -> Result<Self, DragError> {
        let source = bucket_stage(source)?;
        let destination = destination.map(bucket_stage).transpose()?;
        let deal_id = draggable_id
            .trim()
            .parse::<DealId>()
            .map_err(|_| DragError::InvalidDealId(draggable_id.to_string()))?;
        Ok(Self {
            source,
            destination,
            deal_id,
        })
    }
}

fn bucket_stage(id: &str) -> Result<Stage, DragError> {
    Stage::from_label(id).ok_or_else(|| DragError::UnknownBucket(id.to_string()))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    NoOp,
    Move { deal_id: DealId, to: Stage },
}

/// Decides what a drag means for persistence. Dropping outside the board or back
/// into the source bucket is a no-op; anything else is a single stage move.
/// Every stage is reachable from every other stage.
pub fn compute_transition(event: &DragEvent) -> Transition {
    match event.destination {
        Some(to) if to != event.source => Transition::Move {
            deal_id: event.deal_id,
            to,
        },
        _ => Transition::NoOp,
    }
}

/// Headline numbers for the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub total: usize,
    pub prospecting: usize,
    pub proposal: usize,
    pub negotiation: usize,
    pub closed_won: usize,
    pub closed_lost: usize,
    pub total_value: f64,
    pub avg_value: f64,
}

impl PipelineStats {
    pub fn from_deals(deals: &[Deal]) -> Self {
        let mut stats = PipelineStats {
            total: deals.len(),
            ..Default::default()
        };
        for deal in deals {
            match deal.stage {
                Stage::Prospecting => stats.prospecting += 1,
                Stage::Proposal => stats.proposal += 1,
                Stage::Negotiation => stats.negotiation += 1,
                Stage::ClosedWon => stats.closed_won += 1,
                Stage::ClosedLost => stats.closed_lost += 1,
            }
            stats.total_value += deal.value;
        }
        if stats.total > 0 {
            stats.avg_value = stats.total_value / stats.total as f64;
        }
        stats
    }

    pub fn count_for(&self, stage: Stage) -> usize {
        match stage {
            Stage::Prospecting => self.prospecting,
            Stage::Proposal => self.proposal,
            Stage::Negotiation => self.negotiation,
            Stage::ClosedWon => self.closed_won,
            Stage::ClosedLost => self.closed_lost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompanyRef;
    use chrono::{NaiveDate, Utc};
    use std::collections::HashSet;

    fn deal(id: i64, value: f64, stage: Stage) -> Deal {
        Deal {
            id,
            name: format!("deal {id}"),
            value,
            stage,
            expected_close_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            contact_id: Some(1),
            company_id: CompanyRef::Unresolved,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        let deals: Vec<Deal> = (1..=12)
            .map(|id| deal(id, 100.0, Stage::ALL[(id as usize * 7) % 5]))
            .collect();
        let board = StageBoard::partition(&deals);

        let mut seen = HashSet::new();
        for bucket in board.buckets() {
            for d in &bucket.deals {
                assert_eq!(d.stage, bucket.stage);
                assert!(seen.insert(d.id), "deal {} in two buckets", d.id);
            }
        }
        assert_eq!(seen.len(), deals.len());
        assert_eq!(board.total_count(), 12);
    }

    #[test]
    fn buckets_follow_pipeline_order_and_keep_engine_order() {
        let deals = vec![
            deal(3, 10.0, Stage::ClosedLost),
            deal(1, 20.0, Stage::Prospecting),
            deal(2, 30.0, Stage::Prospecting),
        ];
        let board = StageBoard::partition(&deals);
        let order: Vec<Stage> = board.buckets().iter().map(|b| b.stage).collect();
        assert_eq!(order, Stage::ALL.to_vec());
        let prospecting: Vec<i64> = board
            .bucket(Stage::Prospecting)
            .deals
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(prospecting, vec![1, 2]);
        assert_eq!(board.bucket(Stage::Prospecting).total_value(), 50.0);
        assert!(board.bucket(Stage::Negotiation).deals.is_empty());
        assert_eq!(board.locate(3), Some(Stage::ClosedLost));
        assert_eq!(board.locate(99), None);
    }

    #[test]
    fn same_bucket_drop_is_noop() {
        let event = DragEvent::new(Stage::Proposal, Stage::Proposal, 4);
        assert_eq!(compute_transition(&event), Transition::NoOp);
        let outside = DragEvent::from_identifiers("Proposal", None, "4").unwrap();
        assert_eq!(compute_transition(&outside), Transition::NoOp);
    }

    #[test]
    fn any_stage_reaches_any_other() {
        for from in Stage::ALL {
            for to in Stage::ALL.into_iter().filter(|to| *to != from) {
                let event = DragEvent::new(from, to, 1);
                assert_eq!(
                    compute_transition(&event),
                    Transition::Move { deal_id: 1, to }
                );
            }
        }
    }

    #[test]
    fn identifiers_are_validated() {
        let event = DragEvent::from_identifiers("Prospecting", Some("Closed Won"), " 12 ").unwrap();
        assert_eq!(event, DragEvent::new(Stage::Prospecting, Stage::ClosedWon, 12));
        assert_eq!(
            DragEvent::from_identifiers("Won", Some("Proposal"), "1"),
            Err(DragError::UnknownBucket("Won".into()))
        );
        assert_eq!(
            DragEvent::from_identifiers("Proposal", Some("Negotiation"), "abc"),
            Err(DragError::InvalidDealId("abc".into()))
        );
    }

    #[test]
    fn stats_count_each_stage() {
        let deals = vec![
            deal(1, 100.0, Stage::Prospecting),
            deal(2, 300.0, Stage::ClosedWon),
            deal(3, 200.0, Stage::ClosedWon),
        ];
        let stats = PipelineStats::from_deals(&deals);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count_for(Stage::ClosedWon), 2);
        assert_eq!(stats.total_value, 600.0);
        assert_eq!(stats.avg_value, 200.0);
        assert_eq!(PipelineStats::from_deals(&[]).avg_value, 0.0);
    }
}
