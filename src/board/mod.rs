//! Board layer: columns, cards and their ordering
//!
//! - [`models`]: `Card`, `Column`, `BoardLayout`, `CardDraft`
//! - [`sort_key`]: fractional sort keys
//! - [`service`]: `CardService`, the single write path for cards

pub mod models;
pub mod service;
pub mod sort_key;

pub use models::{BoardLayout, Card, CardDraft, CardSource, Column, TRANSCRIPT_COLUMN, TRASH_COLUMN};
pub use service::CardService;
