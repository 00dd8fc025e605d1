use std::collections::{HashMap, HashSet};

use serde_json::Value;
use shared::domain::{AmlId, StLineId};

/// Model name of the embedded matcher list.
pub const MOVE_LINE_MODEL: &str = "account.move.line";

/// Which auxiliary pane asks for a saved search state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneModel {
    MoveLines,
    Extension(String),
}

impl PaneModel {
    pub fn from_model_name(name: &str) -> Self {
        if name == MOVE_LINE_MODEL {
            PaneModel::MoveLines
        } else {
            PaneModel::Extension(name.to_string())
        }
    }
}

/// Ephemeral per-line UI state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StLineState {
    pub is_loading: bool,
    pub selected_aml_ids: HashSet<AmlId>,
    /// Serialized detail record, restorable without a server round trip.
    pub form_restore_data: Option<String>,
    pub list_amls_search_state: Option<Value>,
}

#[derive(Debug, Default)]
pub struct SelectionStore {
    states: HashMap<StLineId, StLineState>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, st_line_id: StLineId) -> &mut StLineState {
        self.states.entry(st_line_id).or_default()
    }

    pub fn peek(&self, st_line_id: StLineId) -> Option<&StLineState> {
        self.states.get(&st_line_id)
    }

    pub fn reset(&mut self, st_line_id: StLineId) {
        self.states.insert(st_line_id, StLineState::default());
    }

    pub fn get_search_state(&self, st_line_id: StLineId, pane: &PaneModel) -> Option<Value> {
        match pane {
            PaneModel::MoveLines => self
                .states
                .get(&st_line_id)
                .and_then(|state| state.list_amls_search_state.clone()),
            PaneModel::Extension(_) => None,
        }
    }

    /// Drops every entry except the one for `keep`.
    pub fn retain_only(&mut self, keep: Option<StLineId>) {
        self.states.retain(|id, _| Some(*id) == keep);
    }

    pub fn set_loading(&mut self, st_line_id: StLineId, loading: bool) {
        self.get(st_line_id).is_loading = loading;
    }

    /// Returns `true` when the set differs from what was stored.
    pub fn set_selected_aml_ids(
        &mut self,
        st_line_id: StLineId,
        ids: impl IntoIterator<Item = AmlId>,
    ) -> bool {
        let ids: HashSet<AmlId> = ids.into_iter().collect();
        let state = self.get(st_line_id);
        if state.selected_aml_ids == ids {
            return false;
        }
        state.selected_aml_ids = ids;
        true
    }

    pub fn set_form_restore_data(&mut self, st_line_id: StLineId, snapshot: String) {
        self.get(st_line_id).form_restore_data = Some(snapshot);
    }

    pub fn set_list_search_state(&mut self, st_line_id: StLineId, search_state: Option<Value>) {
        self.get(st_line_id).list_amls_search_state = search_state;
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/selection_store_tests.rs"]
mod tests;
