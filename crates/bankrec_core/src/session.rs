use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    form::{FormController, FormHost},
    kanban::{KanbanController, KanbanLocalState, KanbanOptions},
    panes::GlobalInfoPane,
    session_counter::CounterSummary,
    BankRecContext, BankRecEvent,
};

/// A mounted reconciliation widget: list, editor slot and balance header
/// wired to one context.
pub struct BankRecSession {
    ctx: Arc<BankRecContext>,
    form_host: Arc<FormHost>,
    kanban: Arc<KanbanController>,
    global_info: Arc<GlobalInfoPane>,
}

impl BankRecSession {
    pub async fn start(ctx: Arc<BankRecContext>, options: KanbanOptions) -> Result<Self> {
        let form_host = FormHost::new(ctx.clone());
        let kanban = KanbanController::mount(ctx.clone(), options).await?;
        let global_info = GlobalInfoPane::mount(ctx.clone()).await?;
        info!(
            lines = kanban.records().len(),
            selected = ?kanban.selected_st_line_id().map(|id| id.0),
            "reconciliation session started"
        );
        Ok(Self {
            ctx,
            form_host,
            kanban,
            global_info,
        })
    }

    pub fn context(&self) -> &Arc<BankRecContext> {
        &self.ctx
    }

    pub fn kanban(&self) -> &Arc<KanbanController> {
        &self.kanban
    }

    pub fn form(&self) -> Option<Arc<FormController>> {
        self.form_host.current()
    }

    pub fn global_info(&self) -> &Arc<GlobalInfoPane> {
        &self.global_info
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BankRecEvent> {
        self.ctx.subscribe_events()
    }

    pub fn counter_summary(&self) -> Option<CounterSummary> {
        self.ctx.counter().summary()
    }

    pub fn dismiss_summary(&self) {
        self.ctx.counter().init();
    }

    /// Tears the session down and returns what a later mount needs to
    /// reopen the same line.
    pub fn unmount(self) -> KanbanLocalState {
        let state = self.kanban.local_state();
        info!(selected = ?state.selected_st_line_id.map(|id| id.0), "reconciliation session closed");
        state
    }
}
