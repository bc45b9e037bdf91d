// State Store
// SQLite persistence for every collection the pipeline touches. Documents
// are stored as JSON alongside the columns queries filter on, mirroring the
// keyed-collection model of the hosted store this abstracts.

mod db;
mod dlq;
mod error;
mod jobs;
mod ops;
mod videos;

pub use db::StateStore;
pub use dlq::DlqQuery;
pub use error::{StoreError, StoreResult};
pub use jobs::InsertOutcome;
pub use ops::CostCategory;
pub use videos::VideoTransitionExtra;
