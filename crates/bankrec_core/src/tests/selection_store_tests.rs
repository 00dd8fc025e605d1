use super::*;
use serde_json::json;

#[test]
fn get_lazily_creates_default_state() {
    let mut store = SelectionStore::new();
    assert!(store.peek(StLineId(1)).is_none());

    let state = store.get(StLineId(1)).clone();
    assert_eq!(state, StLineState::default());
    assert!(!state.is_loading);
    assert!(state.selected_aml_ids.is_empty());
    assert_eq!(store.len(), 1);
}

#[test]
fn reset_only_touches_the_given_line() {
    let mut store = SelectionStore::new();
    store.set_loading(StLineId(1), true);
    store.set_form_restore_data(StLineId(2), "{}".to_string());

    store.reset(StLineId(1));

    assert_eq!(store.peek(StLineId(1)), Some(&StLineState::default()));
    assert_eq!(
        store
            .peek(StLineId(2))
            .and_then(|state| state.form_restore_data.as_deref()),
        Some("{}")
    );
}

#[test]
fn search_state_is_only_served_to_the_matcher_pane() {
    let mut store = SelectionStore::new();
    let facets = json!({"facets": [{"group": "partner", "value": "Azure"}]});
    store.set_list_search_state(StLineId(4), Some(facets.clone()));

    assert_eq!(
        store.get_search_state(StLineId(4), &PaneModel::from_model_name("account.move.line")),
        Some(facets)
    );
    assert_eq!(
        store.get_search_state(StLineId(4), &PaneModel::from_model_name("account.payment")),
        None
    );
    assert_eq!(store.get_search_state(StLineId(5), &PaneModel::MoveLines), None);
}

#[test]
fn selected_ids_report_changes_only() {
    let mut store = SelectionStore::new();
    assert!(store.set_selected_aml_ids(StLineId(1), [AmlId(3), AmlId(4)]));
    assert!(!store.set_selected_aml_ids(StLineId(1), [AmlId(4), AmlId(3)]));
    assert!(store.set_selected_aml_ids(StLineId(1), []));
}

#[test]
fn retain_only_keeps_a_single_entry() {
    let mut store = SelectionStore::new();
    for id in 1..=3 {
        store.set_loading(StLineId(id), true);
    }

    store.retain_only(Some(StLineId(2)));
    assert_eq!(store.len(), 1);
    assert!(store.peek(StLineId(2)).is_some());

    store.retain_only(None);
    assert!(store.is_empty());
}
