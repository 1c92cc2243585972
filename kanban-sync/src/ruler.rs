//! Ruler automation: relocate completed items into the project's ruler column

use crate::item::MoveItem;
use crate::mutation::MutationPlan;
use crate::reindex;
use crate::types::BoardSnapshot;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings for the ruler automation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulerConfig {
    pub enabled: bool,
}

impl Default for RulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Watches committed plans for items entering the terminal status
#[derive(Debug, Clone, Default)]
pub struct RulerRule {
    config: RulerConfig,
}

impl RulerRule {
    pub fn new(config: RulerConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Follow-up moves for a plan that has just committed.
    ///
    /// `board` must be the store's state after the commit. An item gets a
    /// follow-up only when its status went from non-terminal to terminal, its
    /// project has a ruler column, and it is not already in that column. The
    /// move targets the tail of the ruler column.
    pub fn follow_ups(&self, plan: &MutationPlan, board: &BoardSnapshot) -> Vec<MoveItem> {
        if !self.config.enabled {
            return Vec::new();
        }

        plan.completions()
            .filter_map(|transition| {
                let item = board.find_item(&transition.item_id)?;
                let project = board.item_project(&item.id)?;
                let Some(ruler) = board.ruler_column(project) else {
                    debug!(item = %item.id, project = %project, "no ruler column, item stays put");
                    return None;
                };
                if item.column_id == ruler.id {
                    return None;
                }
                let tail = reindex::tail_position(&board.column_items(&ruler.id));
                debug!(item = %item.id, ruler = %ruler.id, tail, "moving completed item to ruler");
                Some(MoveItem::new(item.id.clone(), ruler.id.clone()).at_index(tail).automated())
            })
            .collect()
    }
}
