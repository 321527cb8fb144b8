//! Per-session append-only version history: checkpoints and edit
//! records. Capped at 100 entries total, uniformly across every entry
//! kind — including checkpoints.

use crate::pig::graph::Pig;

const MAX_HISTORY_ENTRIES: usize = 100;

#[derive(Debug, Clone)]
pub enum HistoryEntryKind {
    Checkpoint { snapshot: Box<Pig> },
    DirectEdit { operation: String },
    ParameterUpdate { parameter: String },
    LoadPrevious { source: String },
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub description: String,
    pub kind: HistoryEntryKind,
}

#[derive(Debug, Clone, Default)]
pub struct VersionHistory {
    entries: Vec<HistoryEntry>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let overflow = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(0..overflow);
        }
    }

    pub fn push_checkpoint(&mut self, id: String, description: String, snapshot: Pig) {
        self.push(HistoryEntry {
            id,
            description,
            kind: HistoryEntryKind::Checkpoint {
                snapshot: Box::new(snapshot),
            },
        });
    }

    pub fn find_checkpoint(&self, id: &str) -> Option<&Pig> {
        self.entries.iter().find_map(|entry| match &entry.kind {
            HistoryEntryKind::Checkpoint { snapshot } if entry.id == id => Some(snapshot.as_ref()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_caps_at_max_entries_uniformly() {
        let mut history = VersionHistory::new();
        for i in 0..(MAX_HISTORY_ENTRIES + 10) {
            history.push_checkpoint(format!("c{i}"), "auto".into(), Pig::new());
        }
        assert_eq!(history.entries().len(), MAX_HISTORY_ENTRIES);
        // The oldest 10 checkpoints were trimmed, including checkpoints.
        assert!(history.find_checkpoint("c0").is_none());
        assert!(history.find_checkpoint("c9").is_none());
        assert!(history.find_checkpoint("c10").is_some());
    }

    #[test]
    fn find_checkpoint_by_id() {
        let mut history = VersionHistory::new();
        history.push_checkpoint("c1".into(), "before edit".into(), Pig::new());
        assert!(history.find_checkpoint("c1").is_some());
        assert!(history.find_checkpoint("missing").is_none());
    }
}
