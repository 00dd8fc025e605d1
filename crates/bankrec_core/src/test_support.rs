use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map};
use shared::{
    domain::{JournalId, LineFlag, LineIndex, RecoModelId, RecordState, StLineId},
    protocol::{
        ActionParams, ActionRequest, DetailRecord, GlobalInfo, LinesWidget, NextActionTodo,
        ProposedLine, RecoModelButton, StLineQuery, StatementLine,
    },
    todo::{FormButton, TodoCommand},
};

use crate::{lock, ActionDispatcher, BankRecContext, ReconciliationService};

pub fn st_line(id: i64, journal_id: i64, is_reconciled: bool) -> StatementLine {
    StatementLine {
        id: StLineId(id),
        journal_id: JournalId(journal_id),
        statement_id: None,
        move_id: None,
        move_name: format!("BNK1/2024/{id:05}"),
        date: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
        payment_ref: format!("REF{id}"),
        partner_name: None,
        amount: 100.0,
        currency: None,
        is_reconciled,
        to_check: false,
    }
}

pub fn proposed_line(index: &str, flag: LineFlag, balance: f64) -> ProposedLine {
    ProposedLine {
        index: LineIndex::new(index),
        flag,
        account_id: None,
        account_name: None,
        partner_id: None,
        partner_name: None,
        date: None,
        name: format!("line {index}"),
        amount_currency: balance,
        currency: None,
        balance,
        tax_ids: Vec::new(),
        tax_base_amount_currency: None,
        source_aml_id: None,
        move_id: None,
    }
}

pub fn detail_record(line: &StatementLine) -> DetailRecord {
    DetailRecord {
        st_line_id: line.id,
        journal_id: line.journal_id,
        state: if line.is_reconciled {
            RecordState::Reconciled
        } else {
            RecordState::Invalid
        },
        to_check: line.to_check,
        form_index: None,
        lines_widget: LinesWidget {
            lines: vec![proposed_line("0", LineFlag::Liquidity, line.amount)],
            ..LinesWidget::default()
        },
        reco_models_widget: vec![RecoModelButton {
            id: RecoModelId(1),
            name: "Bank fees".to_string(),
            selected: false,
        }],
        selected_aml_ids: Vec::new(),
        next_action_todo: None,
    }
}

/// In-memory server: applies todo commands to stored records the way the
/// widget model would, and records every call.
#[derive(Default)]
pub struct FakeReconciliationService {
    lines: Mutex<Vec<StatementLine>>,
    records: Mutex<HashMap<StLineId, DetailRecord>>,
    directives: Mutex<HashMap<String, NextActionTodo>>,
    commands: Mutex<Vec<(StLineId, String)>>,
    detail_loads: Mutex<Vec<StLineId>>,
    line_load_delays: Mutex<VecDeque<Duration>>,
    command_delays: Mutex<VecDeque<Duration>>,
    line_loads: AtomicUsize,
    global_info_journals: Mutex<Vec<Option<JournalId>>>,
}

impl FakeReconciliationService {
    pub fn with_lines(lines: Vec<StatementLine>) -> Arc<Self> {
        let service = Self::default();
        {
            let mut records = lock(&service.records);
            for line in &lines {
                records.insert(line.id, detail_record(line));
            }
        }
        *lock(&service.lines) = lines;
        Arc::new(service)
    }

    pub fn set_lines(&self, lines: Vec<StatementLine>) {
        {
            let mut records = lock(&self.records);
            for line in &lines {
                records.entry(line.id).or_insert_with(|| detail_record(line));
            }
        }
        *lock(&self.lines) = lines;
    }

    pub fn set_reconciled(&self, st_line_id: StLineId, reconciled: bool) {
        for line in lock(&self.lines).iter_mut() {
            if line.id == st_line_id {
                line.is_reconciled = reconciled;
            }
        }
    }

    pub fn update_record(&self, st_line_id: StLineId, update: impl FnOnce(&mut DetailRecord)) {
        if let Some(record) = lock(&self.records).get_mut(&st_line_id) {
            update(record);
        }
    }

    /// Attaches a directive to every response to `key`, a todo verb or a
    /// button name.
    pub fn respond_with(&self, key: &str, directive: NextActionTodo) {
        lock(&self.directives).insert(key.to_string(), directive);
    }

    pub fn delay_next_line_load(&self, delay: Duration) {
        lock(&self.line_load_delays).push_back(delay);
    }

    pub fn delay_next_command(&self, delay: Duration) {
        lock(&self.command_delays).push_back(delay);
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands)
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn commands_for(&self, st_line_id: StLineId) -> Vec<String> {
        lock(&self.commands)
            .iter()
            .filter(|(id, _)| *id == st_line_id)
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn detail_loads(&self) -> Vec<StLineId> {
        lock(&self.detail_loads).clone()
    }

    pub fn line_loads(&self) -> usize {
        self.line_loads.load(Ordering::SeqCst)
    }

    pub fn global_info_journals(&self) -> Vec<Option<JournalId>> {
        lock(&self.global_info_journals).clone()
    }

    fn apply(&self, record: &mut DetailRecord, command: &TodoCommand) {
        record.next_action_todo = None;
        match command {
            TodoCommand::TriggerMatchingRules => {}
            TodoCommand::MountLineInEdit(index) => record.form_index = Some(index.clone()),
            TodoCommand::ClearEditForm => record.form_index = None,
            TodoCommand::RemoveLine(index) => {
                record.lines_widget.lines.retain(|line| &line.index != index);
                if record.form_index.as_ref() == Some(index) {
                    record.form_index = None;
                }
            }
            TodoCommand::AddNewAmls(ids) => {
                for id in ids {
                    record.selected_aml_ids.push(*id);
                    let amount = -record_amount(record);
                    let mut line = proposed_line(&format!("aml_{id}"), LineFlag::Matched, amount);
                    line.source_aml_id = Some(*id);
                    record.lines_widget.lines.push(line);
                }
                record.state = RecordState::Valid;
            }
            TodoCommand::RemoveNewAmls(ids) => {
                record.selected_aml_ids.retain(|id| !ids.contains(id));
                record
                    .lines_widget
                    .lines
                    .retain(|line| !line.source_aml_id.is_some_and(|id| ids.contains(&id)));
            }
            TodoCommand::SelectReconcileModelButton(model_id) => {
                for button in &mut record.reco_models_widget {
                    button.selected = button.id == *model_id;
                }
                let amount = -record_amount(record);
                record.lines_widget.lines.push(proposed_line(
                    &format!("model_{model_id}"),
                    LineFlag::Manual,
                    amount,
                ));
                record.state = RecordState::Valid;
            }
            TodoCommand::UnselectReconcileModelButton(model_id) => {
                for button in &mut record.reco_models_widget {
                    if button.id == *model_id {
                        button.selected = false;
                    }
                }
                let index = LineIndex::new(format!("model_{model_id}"));
                record.lines_widget.lines.retain(|line| line.index != index);
            }
            TodoCommand::ButtonClicked(FormButton::Validate) => {
                record.state = RecordState::Reconciled;
                record.form_index = None;
                self.set_reconciled(record.st_line_id, true);
                record.next_action_todo = Some(NextActionTodo::ReconcileStLine);
            }
            TodoCommand::ButtonClicked(FormButton::Reset) => {
                record.state = RecordState::Invalid;
                self.set_reconciled(record.st_line_id, false);
                record.next_action_todo = Some(NextActionTodo::ResetForm);
            }
            TodoCommand::ButtonClicked(FormButton::RedirectToMoveForm(move_id)) => {
                let mut params = Map::new();
                params.insert("res_model".into(), json!("account.move"));
                params.insert("res_id".into(), json!(move_id));
                record.next_action_todo =
                    Some(NextActionTodo::WindowAction(ActionParams(params)));
            }
            TodoCommand::ButtonClicked(_) => {}
        }

        let directives = lock(&self.directives);
        let key = match command {
            TodoCommand::ButtonClicked(button) => button.name(),
            other => other.verb(),
        };
        if let Some(directive) = directives.get(key) {
            record.next_action_todo = Some(directive.clone());
        }
    }
}

fn record_amount(record: &DetailRecord) -> f64 {
    record
        .lines_widget
        .liquidity_line()
        .map(|line| line.balance)
        .unwrap_or_default()
}

#[async_trait]
impl ReconciliationService for FakeReconciliationService {
    async fn load_statement_lines(&self, _query: &StLineQuery) -> Result<Vec<StatementLine>> {
        self.line_loads.fetch_add(1, Ordering::SeqCst);
        let lines = lock(&self.lines).clone();
        let delay = lock(&self.line_load_delays).pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(lines)
    }

    async fn load_detail_record(
        &self,
        st_line_id: StLineId,
        initial_command: Option<&TodoCommand>,
    ) -> Result<DetailRecord> {
        lock(&self.detail_loads).push(st_line_id);
        let mut record = lock(&self.records)
            .get(&st_line_id)
            .cloned()
            .ok_or_else(|| anyhow!("statement line {st_line_id} does not exist"))?;
        if let Some(command) = initial_command {
            self.apply(&mut record, command);
        }
        Ok(record)
    }

    async fn apply_todo_command(
        &self,
        record: &DetailRecord,
        command: &TodoCommand,
    ) -> Result<DetailRecord> {
        lock(&self.commands).push((record.st_line_id, command.to_string()));
        let delay = lock(&self.command_delays).pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut updated = record.clone();
        self.apply(&mut updated, command);
        let mut stored = updated.clone();
        stored.next_action_todo = None;
        lock(&self.records).insert(record.st_line_id, stored);
        Ok(updated)
    }

    async fn collect_global_info(&self, journal_id: Option<JournalId>) -> Result<GlobalInfo> {
        lock(&self.global_info_journals).push(journal_id);
        let reconciled = lock(&self.lines)
            .iter()
            .filter(|line| line.is_reconciled)
            .count();
        Ok(GlobalInfo {
            balance_amount: Some(format!("{reconciled} reconciled")),
            ..GlobalInfo::default()
        })
    }

    async fn open_reconciliation_report(
        &self,
        journal_id: Option<JournalId>,
    ) -> Result<ActionRequest> {
        let mut params = Map::new();
        params.insert("tag".into(), json!("account_report"));
        params.insert("context".into(), json!({"active_id": journal_id}));
        Ok(ActionRequest {
            kind: ActionRequest::CLIENT.to_string(),
            params,
        })
    }
}

#[derive(Default)]
pub struct RecordingActionDispatcher {
    actions: Mutex<Vec<ActionRequest>>,
}

impl RecordingActionDispatcher {
    pub fn actions(&self) -> Vec<ActionRequest> {
        lock(&self.actions).clone()
    }
}

#[async_trait]
impl ActionDispatcher for RecordingActionDispatcher {
    async fn do_action(&self, action: ActionRequest) -> Result<()> {
        lock(&self.actions).push(action);
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<FakeReconciliationService>,
    pub actions: Arc<RecordingActionDispatcher>,
    pub ctx: Arc<BankRecContext>,
}

impl Harness {
    pub fn new(lines: Vec<StatementLine>) -> Self {
        let service = FakeReconciliationService::with_lines(lines);
        let actions = Arc::new(RecordingActionDispatcher::default());
        let ctx = BankRecContext::new(service.clone(), actions.clone());
        Self {
            service,
            actions,
            ctx,
        }
    }

    /// Three open lines of journal 1: the usual L1/L2/L3 page.
    pub fn three_lines() -> Self {
        Self::new(vec![st_line(1, 1, false), st_line(2, 1, false), st_line(3, 1, false)])
    }
}
