//! CRM deal pipeline.
//!
//! Deals are classified into five ordered stages. The visible collection is
//! derived by a pure filter + stable sort, partitioned into stage buckets for
//! the board, and moved between buckets by drag-and-drop once the repository
//! confirms the new stage. The same collection feeds the CSV export.

pub mod board;
pub mod export;
pub mod filter;
pub mod model;
pub mod notify;
pub mod repository;
pub mod sort;
pub mod validate;
pub mod view;

pub use board::{
    DragError, DragEvent, PipelineStats, StageBoard, StageBucket, Transition, compute_transition,
};
pub use export::{
    DirectoryDelivery, ExportDelivery, ExportError, ExportFile, build_export, encode_deals,
};
pub use filter::{DealFilter, filter_deals};
pub use model::{
    Company, CompanyId, CompanyRef, Contact, ContactId, Deal, DealId, DealPayload, Stage,
};
pub use notify::{Level, Notification, NotificationLog, Notifier, TracingNotifier};
pub use repository::{
    DealRepository, InMemoryDealRepository, RepositoryError, RepositoryResult, parse_deal_id,
};
pub use sort::{SortDirection, SortKey, sort_deals, sorted};
pub use validate::{DealField, DealForm, ValidationErrors, contacts_for_company};
pub use view::{DealQuery, DealsView, DragOutcome, SubmitError};
