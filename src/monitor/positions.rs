// =============================================================================
// PositionRegistry — in-memory per-bot Position, single-writer (Monitor only)
// =============================================================================
//
// Spec §3: "Position records are owned by the Monitor. The Executor does not
// mutate them; it only produces `filled` OrderState rows." Keyed by bot id
// rather than symbol since one symbol can host several bots with their own
// credentials and sizing.
// =============================================================================

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::Position;

#[derive(Default)]
pub struct PositionRegistry {
    inner: RwLock<HashMap<Uuid, Position>>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, bot_id: Uuid) -> Option<Position> {
        self.inner.read().await.get(&bot_id).cloned()
    }

    pub async fn contains(&self, bot_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&bot_id)
    }

    pub async fn insert(&self, bot_id: Uuid, position: Position) {
        self.inner.write().await.insert(bot_id, position);
    }

    pub async fn remove(&self, bot_id: Uuid) -> Option<Position> {
        self.inner.write().await.remove(&bot_id)
    }
}
