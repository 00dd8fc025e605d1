//! Auxiliary panes around the editor: the journal item matcher, the
//! reconciliation model buttons and the journal balance header.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use shared::{
    domain::{AccountId, AmlId, LineFlag, RecoModelId, StLineId, TaxId},
    protocol::{ActionRequest, DetailRecord, GlobalInfo},
    todo::TodoCommand,
};
use tracing::{debug, info};

use crate::{
    bind,
    command_bus::{
        FormRecoModelClicked, FormTodoCommand, GlobalInfoRefresh, KanbanDoAction, RecoModelClick,
        Registration,
    },
    lock,
    selection_store::PaneModel,
    BankRecContext, BankRecEvent,
};

/// Candidate journal items for the open line. Keeps its search facets in
/// the selection store so they come back when the line is reopened.
pub struct AmlsMatcherPane {
    ctx: Arc<BankRecContext>,
    st_line_id: StLineId,
    search_state: Mutex<Option<Value>>,
    loaded_domain: Mutex<Option<String>>,
}

impl AmlsMatcherPane {
    pub fn mount(ctx: Arc<BankRecContext>, st_line_id: StLineId) -> Self {
        let search_state = ctx
            .selection()
            .get_search_state(st_line_id, &PaneModel::MoveLines);
        if search_state.is_some() {
            debug!(%st_line_id, "restored matcher search state");
        }
        Self {
            ctx,
            st_line_id,
            search_state: Mutex::new(search_state),
            loaded_domain: Mutex::new(None),
        }
    }

    pub fn search_state(&self) -> Option<Value> {
        lock(&self.search_state).clone()
    }

    pub fn set_search_state(&self, search_state: Option<Value>) {
        *lock(&self.search_state) = search_state;
    }

    pub fn should_load(&self, domain: &str) -> bool {
        let mut loaded = lock(&self.loaded_domain);
        if loaded.as_deref() == Some(domain) {
            return false;
        }
        *loaded = Some(domain.to_string());
        true
    }

    pub fn is_selected(&self, aml_id: AmlId) -> bool {
        self.ctx
            .selection()
            .peek(self.st_line_id)
            .is_some_and(|state| state.selected_aml_ids.contains(&aml_id))
    }

    pub async fn toggle(&self, aml_id: AmlId) -> Result<()> {
        let command = if self.is_selected(aml_id) {
            TodoCommand::RemoveNewAmls(vec![aml_id])
        } else {
            TodoCommand::AddNewAmls(vec![aml_id])
        };
        self.ctx.bus.invoke::<FormTodoCommand>(command).await
    }

    pub fn save_search_state(&self) {
        let search_state = self.search_state();
        self.ctx
            .selection()
            .set_list_search_state(self.st_line_id, search_state);
    }
}

impl Drop for AmlsMatcherPane {
    fn drop(&mut self) {
        self.save_search_state();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelLineProposal {
    pub label: String,
    pub amount: f64,
    pub account_id: Option<AccountId>,
    pub tax_ids: Vec<TaxId>,
    /// Share of the amount still open when this line is reached.
    pub percentage: f64,
}

impl ModelLineProposal {
    pub fn amount_string(&self) -> String {
        format!("{:.5}", self.percentage)
    }

    fn to_command(&self) -> Value {
        json!([0, 0, {
            "label": self.label,
            "amount": self.amount,
            "account_id": self.account_id,
            "tax_ids": [[6, 0, self.tax_ids]],
            "amount_type": "percentage",
            "amount_string": self.amount_string(),
        }])
    }
}

pub struct RecoModelsPane {
    ctx: Arc<BankRecContext>,
}

impl RecoModelsPane {
    pub fn new(ctx: Arc<BankRecContext>) -> Self {
        Self { ctx }
    }

    pub async fn select(&self, model_id: RecoModelId, already_selected: bool) -> Result<()> {
        self.ctx
            .bus
            .invoke::<FormRecoModelClicked>(RecoModelClick {
                model_id,
                already_selected,
            })
            .await
    }

    /// Manual lines expressed as percentages of the liquidity amount. Each
    /// share is taken from what the previous lines left open.
    pub fn model_line_proposals(record: &DetailRecord) -> Vec<ModelLineProposal> {
        let widget = &record.lines_widget;
        let mut remaining = widget
            .liquidity_line()
            .map(|line| line.balance)
            .unwrap_or_default();

        widget
            .lines
            .iter()
            .filter(|line| line.flag == LineFlag::Manual)
            .map(|line| {
                let base_amount = if line.tax_ids.is_empty() {
                    -line.balance
                } else {
                    -line.tax_base_amount_currency.unwrap_or(line.balance)
                };
                let percentage = if remaining == 0.0 {
                    0.0
                } else {
                    base_amount / remaining * 100.0
                };
                remaining -= base_amount;
                ModelLineProposal {
                    label: line.name.clone(),
                    amount: line.balance,
                    account_id: line.account_id,
                    tax_ids: line.tax_ids.clone(),
                    percentage,
                }
            })
            .collect()
    }

    pub fn quick_create_action(record: &DetailRecord) -> ActionRequest {
        let line_ids: Vec<Value> = Self::model_line_proposals(record)
            .iter()
            .map(ModelLineProposal::to_command)
            .collect();
        let mut params = Map::new();
        params.insert("res_model".into(), json!("account.reconcile.model"));
        params.insert("views".into(), json!([[false, "form"]]));
        params.insert("target".into(), json!("current"));
        params.insert(
            "context".into(),
            json!({
                "default_match_journal_ids": [record.journal_id],
                "default_line_ids": line_ids,
                "default_to_check": record.to_check,
            }),
        );
        ActionRequest::window(params)
    }

    pub async fn create_model_from_proposal(&self, record: &DetailRecord) -> Result<()> {
        let action = Self::quick_create_action(record);
        info!(st_line_id = %record.st_line_id, "creating reconciliation model from proposal");
        self.ctx.bus.invoke::<KanbanDoAction>(action).await
    }
}

pub struct GlobalInfoPane {
    ctx: Arc<BankRecContext>,
    data: Mutex<GlobalInfo>,
    registration: Mutex<Option<Registration>>,
}

impl GlobalInfoPane {
    pub async fn mount(ctx: Arc<BankRecContext>) -> Result<Arc<Self>> {
        let pane = Arc::new(Self {
            ctx: ctx.clone(),
            data: Mutex::new(GlobalInfo::default()),
            registration: Mutex::new(None),
        });
        let registration = ctx
            .bus
            .register::<GlobalInfoRefresh, _, _>(bind(&pane, |pane, ()| async move {
                pane.fetch_data().await
            }));
        *lock(&pane.registration) = Some(registration);
        pane.fetch_data().await?;
        Ok(pane)
    }

    pub fn data(&self) -> GlobalInfo {
        lock(&self.data).clone()
    }

    pub async fn fetch_data(&self) -> Result<()> {
        let journal_id = self.ctx.kanban_state().current_journal_id;
        let info = self
            .ctx
            .service()
            .collect_global_info(journal_id)
            .await
            .context("failed to collect journal balance")?;
        debug!(journal_id = ?journal_id.map(|id| id.0), "journal balance refreshed");
        *lock(&self.data) = info.clone();
        self.ctx.emit(BankRecEvent::GlobalInfoUpdated(info));
        Ok(())
    }

    pub async fn open_report(&self) -> Result<()> {
        let journal_id = self.ctx.kanban_state().current_journal_id;
        let action = self
            .ctx
            .service()
            .open_reconciliation_report(journal_id)
            .await
            .context("failed to open the reconciliation report")?;
        self.ctx.bus.invoke::<KanbanDoAction>(action).await
    }
}

#[cfg(test)]
#[path = "tests/panes_tests.rs"]
mod tests;
