//! Board data models: columns and cards

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Column receiving raw transcript segments.
pub const TRANSCRIPT_COLUMN: &str = "transcript";

/// Column holding soft-deleted cards until the trash is emptied.
pub const TRASH_COLUMN: &str = "trash";

// ============================================================================
// Columns
// ============================================================================

/// A board column. `position` drives display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    pub position: u32,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>, position: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            position,
        }
    }
}

/// The set of columns a board is made of.
///
/// The trash column is always present, whatever the caller passes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardLayout {
    columns: Vec<Column>,
}

impl BoardLayout {
    pub fn new(mut columns: Vec<Column>) -> Self {
        if !columns.iter().any(|c| c.id == TRASH_COLUMN) {
            let position = columns.iter().map(|c| c.position + 1).max().unwrap_or(0);
            columns.push(Column::new(TRASH_COLUMN, "Trash", position));
        }
        columns.sort_by_key(|c| c.position);
        Self { columns }
    }

    /// Columns in display order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn contains(&self, column_id: &str) -> bool {
        self.columns.iter().any(|c| c.id == column_id)
    }

    /// Display position of a column; unknown columns sort last.
    pub fn position(&self, column_id: &str) -> u32 {
        self.columns
            .iter()
            .find(|c| c.id == column_id)
            .map(|c| c.position)
            .unwrap_or(u32::MAX)
    }

    /// Add a column if it is not already part of the layout (used for custom agents).
    pub fn ensure_column(&mut self, column_id: &str, title: &str) {
        if self.contains(column_id) {
            return;
        }
        // Keep trash at the end
        let trash_pos = self.position(TRASH_COLUMN);
        for c in self.columns.iter_mut().filter(|c| c.id == TRASH_COLUMN) {
            c.position = trash_pos + 1;
        }
        self.columns.push(Column::new(column_id, title, trash_pos));
        self.columns.sort_by_key(|c| c.position);
    }
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self::new(vec![
            Column::new(TRANSCRIPT_COLUMN, "Transcript", 0),
            Column::new("summary", "Summary", 1),
            Column::new("insights", "Insights", 2),
            Column::new("questions", "Questions", 3),
            Column::new("actions", "Action Items", 4),
            Column::new("synthesis", "Synthesis", 5),
            Column::new("follow_ups", "Follow-ups", 6),
            Column::new(TRASH_COLUMN, "Trash", 7),
        ])
    }
}

// ============================================================================
// Cards
// ============================================================================

/// Where a card came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSource {
    Transcript,
    Agent,
    User,
}

/// Atomic content unit belonging to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub column_id: String,
    pub session_id: Uuid,
    pub content: String,
    pub source: CardSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_agent_name: Option<String>,
    /// Links to other cards
    #[serde(default)]
    pub links: Vec<Uuid>,
    /// Free-form tags set by users
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Tags assigned by agents
    #[serde(default)]
    pub ai_tags: BTreeSet<String>,
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub deleted: bool,
    /// Column the card lived in before it was moved to trash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_from: Option<String>,
    /// Fractional index, see [`super::sort_key`]
    pub sort_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(
        session_id: Uuid,
        column_id: impl Into<String>,
        content: impl Into<String>,
        source: CardSource,
        sort_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            column_id: column_id.into(),
            session_id,
            content: content.into(),
            source,
            source_agent_name: None,
            links: Vec::new(),
            tags: BTreeSet::new(),
            ai_tags: BTreeSet::new(),
            highlighted: false,
            deleted: false,
            deleted_from: None,
            sort_key,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.source_agent_name = Some(agent_name.into());
        self
    }
}

/// Card content produced by an agent, before it is placed on the board.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardDraft {
    pub content: String,
    /// Target column; `None` means the producing agent's column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CardDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn in_column(mut self, column_id: impl Into<String>) -> Self {
        self.column_id = Some(column_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}
