//! Card service
//!
//! Single write path for cards: validates the target column, allocates
//! fractional sort keys, persists through the [`BoardStore`] and publishes
//! `card:created` / `card:updated` on the event bus.

use super::models::{BoardLayout, Card, CardDraft, CardSource, TRASH_COLUMN};
use super::sort_key::key_between;
use crate::error::BoardError;
use crate::events::{BoardEvent, EventEmitter};
use crate::store::BoardStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub struct CardService {
    store: Arc<dyn BoardStore>,
    events: Arc<dyn EventEmitter>,
    layout: Arc<BoardLayout>,
    /// Serializes sort key allocation so concurrent writers never pick the same key
    placement: Mutex<()>,
}

impl CardService {
    pub fn new(
        store: Arc<dyn BoardStore>,
        events: Arc<dyn EventEmitter>,
        layout: Arc<BoardLayout>,
    ) -> Self {
        Self {
            store,
            events,
            layout,
            placement: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    fn check_column(&self, column_id: &str) -> Result<()> {
        if !self.layout.contains(column_id) {
            return Err(BoardError::UnknownColumn(column_id.to_string()).into());
        }
        Ok(())
    }

    async fn load(&self, card_id: Uuid) -> Result<Card> {
        self.store
            .get_card(card_id)
            .await?
            .ok_or_else(|| BoardError::CardNotFound(card_id).into())
    }

    /// Sort key placing a card after the last card of a column.
    async fn next_key(&self, session_id: Uuid, column_id: &str) -> Result<String> {
        let cards = self.store.list_cards(session_id, Some(column_id)).await?;
        let last = cards.iter().map(|c| c.sort_key.as_str()).max();
        Ok(key_between(last, None)?)
    }

    // ========================================================================
    // Creation & edits
    // ========================================================================

    /// Append a new card at the end of a column and publish `card:created`.
    pub async fn create_card(
        &self,
        session_id: Uuid,
        column_id: &str,
        content: &str,
        source: CardSource,
        agent_name: Option<&str>,
    ) -> Result<Card> {
        self.insert(session_id, column_id, content, source, agent_name, &Default::default())
            .await
    }

    /// Place an agent's draft, tagging the card with the draft's tags as AI tags.
    pub async fn create_from_draft(
        &self,
        session_id: Uuid,
        default_column: &str,
        draft: &CardDraft,
        agent_name: &str,
    ) -> Result<Card> {
        let column = draft.column_id.as_deref().unwrap_or(default_column);
        self.insert(
            session_id,
            column,
            &draft.content,
            CardSource::Agent,
            Some(agent_name),
            &draft.tags,
        )
        .await
    }

    async fn insert(
        &self,
        session_id: Uuid,
        column_id: &str,
        content: &str,
        source: CardSource,
        agent_name: Option<&str>,
        ai_tags: &BTreeSet<String>,
    ) -> Result<Card> {
        self.check_column(column_id)?;
        if column_id == TRASH_COLUMN {
            return Err(BoardError::UnknownColumn(column_id.to_string()).into());
        }

        let card = {
            let _guard = self.placement.lock().await;
            let key = self.next_key(session_id, column_id).await?;
            let mut card = Card::new(session_id, column_id, content, source, key);
            if let Some(name) = agent_name {
                card = card.with_agent(name);
            }
            card.ai_tags = ai_tags.clone();
            self.store
                .create_card(&card)
                .await
                .context("Failed to persist card")?;
            card
        };

        debug!(card_id = %card.id, column = %card.column_id, source = ?card.source, "Card created");
        self.events
            .emit(BoardEvent::CardCreated { card: card.clone() });
        Ok(card)
    }

    /// Replace a card's content and publish `card:updated`.
    pub async fn update_content(&self, card_id: Uuid, content: &str) -> Result<Card> {
        let mut card = self.load(card_id).await?;
        card.content = content.to_string();
        card.updated_at = Utc::now();
        self.store.update_card(&card).await?;
        self.events
            .emit(BoardEvent::CardUpdated { card: card.clone() });
        Ok(card)
    }

    pub async fn set_highlight(&self, card_id: Uuid, highlighted: bool) -> Result<Card> {
        let mut card = self.load(card_id).await?;
        card.highlighted = highlighted;
        card.updated_at = Utc::now();
        self.store.update_card(&card).await?;
        Ok(card)
    }

    /// Link two cards in both directions. Linking twice is a no-op.
    pub async fn link_cards(&self, a: Uuid, b: Uuid) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let mut card_a = self.load(a).await?;
        let mut card_b = self.load(b).await?;
        if !card_a.links.contains(&b) {
            card_a.links.push(b);
            self.store.update_card(&card_a).await?;
        }
        if !card_b.links.contains(&a) {
            card_b.links.push(a);
            self.store.update_card(&card_b).await?;
        }
        Ok(())
    }

    /// Move a card to `index` within `column_id` (clamped to the column length).
    ///
    /// Only the moved card gets a new key; siblings keep theirs.
    pub async fn move_card(&self, card_id: Uuid, column_id: &str, index: usize) -> Result<Card> {
        self.check_column(column_id)?;
        let _guard = self.placement.lock().await;

        let mut card = self.load(card_id).await?;
        let siblings: Vec<Card> = self
            .store
            .list_cards(card.session_id, Some(column_id))
            .await?
            .into_iter()
            .filter(|c| c.id != card_id)
            .collect();

        let index = index.min(siblings.len());
        let lower = index
            .checked_sub(1)
            .and_then(|i| siblings.get(i))
            .map(|c| c.sort_key.as_str());
        let upper = siblings.get(index).map(|c| c.sort_key.as_str());

        card.sort_key = key_between(lower, upper)?;
        card.column_id = column_id.to_string();
        card.updated_at = Utc::now();
        self.store.update_card(&card).await?;
        Ok(card)
    }

    // ========================================================================
    // Trash
    // ========================================================================

    /// Move a card to the trash column, remembering where it came from.
    pub async fn soft_delete(&self, card_id: Uuid) -> Result<Card> {
        let _guard = self.placement.lock().await;
        let mut card = self.load(card_id).await?;
        if card.deleted {
            return Ok(card);
        }
        let key = self.next_key(card.session_id, TRASH_COLUMN).await?;
        card.deleted_from = Some(std::mem::replace(
            &mut card.column_id,
            TRASH_COLUMN.to_string(),
        ));
        card.deleted = true;
        card.sort_key = key;
        card.updated_at = Utc::now();
        self.store.update_card(&card).await?;
        Ok(card)
    }

    /// Put a trashed card back at the end of its original column.
    pub async fn restore(&self, card_id: Uuid) -> Result<Card> {
        let _guard = self.placement.lock().await;
        let mut card = self.load(card_id).await?;
        if !card.deleted {
            return Ok(card);
        }
        let column = card
            .deleted_from
            .take()
            .filter(|c| self.layout.contains(c))
            .ok_or_else(|| BoardError::UnknownColumn(String::new()))?;
        card.sort_key = self.next_key(card.session_id, &column).await?;
        card.column_id = column;
        card.deleted = false;
        card.updated_at = Utc::now();
        self.store.update_card(&card).await?;
        Ok(card)
    }

    /// Permanently remove every trashed card of a session. Returns the count.
    pub async fn empty_trash(&self, session_id: Uuid) -> Result<usize> {
        let trashed = self.store.list_cards(session_id, Some(TRASH_COLUMN)).await?;
        for card in &trashed {
            self.store.delete_card(card.id).await?;
        }
        info!(session_id = %session_id, purged = trashed.len(), "Trash emptied");
        Ok(trashed.len())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Live (not deleted) cards of the given columns, in column display order
    /// then sort key order.
    pub async fn cards_in_columns(&self, session_id: Uuid, columns: &[String]) -> Result<Vec<Card>> {
        let mut ordered: Vec<&String> = columns.iter().collect();
        ordered.sort_by_key(|c| self.layout.position(c));
        ordered.dedup();

        let mut cards = Vec::new();
        for column in ordered {
            cards.extend(
                self.store
                    .list_cards(session_id, Some(column))
                    .await?
                    .into_iter()
                    .filter(|c| !c.deleted),
            );
        }
        Ok(cards)
    }
}
