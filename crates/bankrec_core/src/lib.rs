use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::{
    domain::{JournalId, RecordState, StLineId},
    protocol::{ActionRequest, DetailRecord, GlobalInfo, StLineQuery, StatementLine},
    todo::TodoCommand,
};
use tokio::sync::broadcast;

pub mod command_bus;
pub mod form;
pub mod kanban;
pub mod notebook;
pub mod panes;
pub mod rpc;
pub mod selection_store;
pub mod session;
pub mod session_counter;
#[cfg(test)]
mod test_support;

pub use command_bus::{CommandBus, FormInit, Registration};
pub use form::{FormController, FormHost};
pub use kanban::{next_eligible_st_line, KanbanController, KanbanLocalState, KanbanOptions};
pub use notebook::NotebookPage;
pub use panes::{AmlsMatcherPane, GlobalInfoPane, ModelLineProposal, RecoModelsPane};
pub use rpc::{OdooRpcService, RpcError};
pub use selection_store::{PaneModel, SelectionStore, StLineState};
pub use session::BankRecSession;
pub use session_counter::{CounterSummary, SessionCounter};

/// Server side of the reconciliation widget. Every mutating call returns the
/// complete recomputed record.
#[async_trait]
pub trait ReconciliationService: Send + Sync {
    async fn load_statement_lines(&self, query: &StLineQuery) -> Result<Vec<StatementLine>>;
    async fn load_detail_record(
        &self,
        st_line_id: StLineId,
        initial_command: Option<&TodoCommand>,
    ) -> Result<DetailRecord>;
    async fn apply_todo_command(
        &self,
        record: &DetailRecord,
        command: &TodoCommand,
    ) -> Result<DetailRecord>;
    async fn collect_global_info(&self, journal_id: Option<JournalId>) -> Result<GlobalInfo>;
    async fn open_reconciliation_report(
        &self,
        journal_id: Option<JournalId>,
    ) -> Result<ActionRequest>;
}

pub struct MissingReconciliationService;

#[async_trait]
impl ReconciliationService for MissingReconciliationService {
    async fn load_statement_lines(&self, _query: &StLineQuery) -> Result<Vec<StatementLine>> {
        Err(anyhow!("reconciliation service is unavailable"))
    }

    async fn load_detail_record(
        &self,
        st_line_id: StLineId,
        _initial_command: Option<&TodoCommand>,
    ) -> Result<DetailRecord> {
        Err(anyhow!(
            "reconciliation service is unavailable for statement line {st_line_id}"
        ))
    }

    async fn apply_todo_command(
        &self,
        record: &DetailRecord,
        command: &TodoCommand,
    ) -> Result<DetailRecord> {
        Err(anyhow!(
            "reconciliation service is unavailable: cannot apply '{command}' to statement line {}",
            record.st_line_id
        ))
    }

    async fn collect_global_info(&self, _journal_id: Option<JournalId>) -> Result<GlobalInfo> {
        Err(anyhow!("reconciliation service is unavailable"))
    }

    async fn open_reconciliation_report(
        &self,
        _journal_id: Option<JournalId>,
    ) -> Result<ActionRequest> {
        Err(anyhow!("reconciliation service is unavailable"))
    }
}

/// Page navigation: window and client actions leave the widget.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn do_action(&self, action: ActionRequest) -> Result<()>;
}

pub struct MissingActionDispatcher;

#[async_trait]
impl ActionDispatcher for MissingActionDispatcher {
    async fn do_action(&self, action: ActionRequest) -> Result<()> {
        Err(anyhow!("no action dispatcher to run '{}'", action.kind))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KanbanState {
    pub selected_st_line_id: Option<StLineId>,
    pub current_journal_id: Option<JournalId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BankRecEvent {
    SelectionChanged {
        st_line_id: Option<StLineId>,
        journal_id: Option<JournalId>,
    },
    ScrollToCard(StLineId),
    LinesReloaded {
        count: usize,
        deep: bool,
    },
    RenderRequested,
    LineLoading {
        st_line_id: StLineId,
        loading: bool,
    },
    DetailRecordUpdated {
        st_line_id: StLineId,
        state: RecordState,
    },
    NotebookPageChanged(NotebookPage),
    FocusField(String),
    GlobalInfoUpdated(GlobalInfo),
    LineValidated {
        reconciled_count: u32,
    },
}

pub struct BankRecContext {
    pub bus: CommandBus,
    service: Arc<dyn ReconciliationService>,
    actions: Arc<dyn ActionDispatcher>,
    selection: Mutex<SelectionStore>,
    counter: Mutex<SessionCounter>,
    kanban_state: RwLock<KanbanState>,
    events: broadcast::Sender<BankRecEvent>,
}

impl BankRecContext {
    pub fn new(
        service: Arc<dyn ReconciliationService>,
        actions: Arc<dyn ActionDispatcher>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            bus: CommandBus::new(),
            service,
            actions,
            selection: Mutex::new(SelectionStore::new()),
            counter: Mutex::new(SessionCounter::default()),
            kanban_state: RwLock::new(KanbanState::default()),
            events,
        })
    }

    pub fn service(&self) -> &dyn ReconciliationService {
        self.service.as_ref()
    }

    pub fn actions(&self) -> &dyn ActionDispatcher {
        self.actions.as_ref()
    }

    pub fn selection(&self) -> MutexGuard<'_, SelectionStore> {
        lock(&self.selection)
    }

    pub fn counter(&self) -> MutexGuard<'_, SessionCounter> {
        lock(&self.counter)
    }

    pub fn kanban_state(&self) -> KanbanState {
        *self
            .kanban_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_kanban_state(&self, state: KanbanState) {
        *self
            .kanban_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BankRecEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: BankRecEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn set_loading(&self, st_line_id: StLineId, loading: bool) {
        self.selection().set_loading(st_line_id, loading);
        self.emit(BankRecEvent::LineLoading {
            st_line_id,
            loading,
        });
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn bind<T, P, F, Fut>(
    owner: &Arc<T>,
    f: F,
) -> impl Fn(P) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static
where
    T: Send + Sync + 'static,
    P: Send + 'static,
    F: Fn(Arc<T>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let owner = Arc::downgrade(owner);
    move |payload: P| -> BoxFuture<'static, Result<()>> {
        match owner.upgrade() {
            Some(owner) => Box::pin(f(owner, payload)),
            None => Box::pin(futures::future::ready(Ok(()))),
        }
    }
}
