//! List coordinator: owns the current page of statement lines and decides
//! which one is open in the editor.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{JournalId, StLineId},
    protocol::{ActionRequest, StLineQuery, StatementLine},
};
use tracing::{debug, info};

use crate::{
    bind,
    command_bus::{
        FormInit, FormMount, FormMountRequest, KanbanDoAction, KanbanMoveToNextLine, KanbanReload,
        KanbanRender, KanbanValidateStLine, Registration,
    },
    lock, BankRecContext, BankRecEvent, KanbanState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanbanLocalState {
    pub selected_st_line_id: Option<StLineId>,
}

#[derive(Debug, Clone, Default)]
pub struct KanbanOptions {
    pub query: StLineQuery,
    pub default_journal_id: Option<JournalId>,
    pub restore: Option<KanbanLocalState>,
    /// Line explicitly opened from outside the widget.
    pub requested_st_line_id: Option<StLineId>,
}

pub struct KanbanController {
    ctx: Arc<BankRecContext>,
    default_journal_id: Option<JournalId>,
    query: Mutex<StLineQuery>,
    records: Mutex<Vec<StatementLine>>,
    reload_generation: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl KanbanController {
    pub async fn mount(ctx: Arc<BankRecContext>, options: KanbanOptions) -> Result<Arc<Self>> {
        ctx.counter().init();
        ctx.set_kanban_state(KanbanState::default());

        let kanban = Arc::new(Self {
            ctx: ctx.clone(),
            default_journal_id: options.default_journal_id,
            query: Mutex::new(options.query.clone()),
            records: Mutex::new(Vec::new()),
            reload_generation: AtomicU64::new(0),
            registrations: Mutex::new(Vec::new()),
        });
        kanban.register_commands();

        let records = ctx
            .service()
            .load_statement_lines(&options.query)
            .await
            .context("failed to load statement lines")?;
        info!(count = records.len(), "loaded statement lines");
        *lock(&kanban.records) = records;

        let restore_id = kanban.restorable_selection(&options);
        let selected = match restore_id {
            Some(id) if kanban.contains(id) => Some(id),
            _ => kanban.next_eligible(None, None),
        };
        kanban.select(selected).await?;
        Ok(kanban)
    }

    /// Clears every per-line state except the one being restored. A saved
    /// state is discarded when the caller asked for a different line.
    fn restorable_selection(&self, options: &KanbanOptions) -> Option<StLineId> {
        let restore_id = options.restore.and_then(|state| state.selected_st_line_id);
        let mut selection = self.ctx.selection();
        match restore_id {
            Some(id) if selection.peek(id).is_some() => {
                if options
                    .requested_st_line_id
                    .map_or(true, |requested| requested == id)
                {
                    selection.retain_only(Some(id));
                    Some(id)
                } else {
                    selection.retain_only(None);
                    None
                }
            }
            other => {
                selection.retain_only(None);
                other
            }
        }
    }

    fn register_commands(self: &Arc<Self>) {
        let bus = &self.ctx.bus;
        let registrations = vec![
            bus.register::<KanbanMoveToNextLine, _, _>(bind(self, |kanban, ()| async move {
                kanban.move_to_next().await
            })),
            bus.register::<KanbanValidateStLine, _, _>(bind(self, |kanban, ()| async move {
                kanban.on_validated().await
            })),
            bus.register::<KanbanReload, _, _>(bind(self, |kanban, deep: bool| async move {
                kanban.reload(deep).await
            })),
            bus.register::<KanbanRender, _, _>(bind(self, |kanban, ()| async move {
                kanban.ctx.emit(BankRecEvent::RenderRequested);
                Ok(())
            })),
            bus.register::<KanbanDoAction, _, _>(bind(
                self,
                |kanban, action: ActionRequest| async move {
                    debug!(kind = %action.kind, "dispatching action");
                    kanban.ctx.actions().do_action(action).await
                },
            )),
        ];
        *lock(&self.registrations) = registrations;
    }

    pub fn records(&self) -> Vec<StatementLine> {
        lock(&self.records).clone()
    }

    pub fn query(&self) -> StLineQuery {
        lock(&self.query).clone()
    }

    pub fn selected_st_line_id(&self) -> Option<StLineId> {
        self.ctx.kanban_state().selected_st_line_id
    }

    pub fn current_journal_id(&self) -> Option<JournalId> {
        self.ctx.kanban_state().current_journal_id
    }

    pub fn local_state(&self) -> KanbanLocalState {
        KanbanLocalState {
            selected_st_line_id: self.selected_st_line_id(),
        }
    }

    fn contains(&self, st_line_id: StLineId) -> bool {
        lock(&self.records).iter().any(|line| line.id == st_line_id)
    }

    fn journal_for(&self, st_line_id: Option<StLineId>) -> Option<JournalId> {
        let records = lock(&self.records);
        st_line_id
            .and_then(|id| records.iter().find(|line| line.id == id))
            .map(|line| line.journal_id)
            .or(self.default_journal_id)
            .or_else(|| records.first().map(|line| line.journal_id))
    }

    pub fn next_eligible(
        &self,
        after: Option<StLineId>,
        snapshot: Option<&[StatementLine]>,
    ) -> Option<StLineId> {
        next_eligible_st_line(&lock(&self.records), after, snapshot)
    }

    pub async fn select(&self, st_line_id: Option<StLineId>) -> Result<()> {
        let previous = self.selected_st_line_id();
        if previous.is_some() && previous == st_line_id {
            return Ok(());
        }

        let journal_id = self.journal_for(st_line_id);
        self.ctx.set_kanban_state(KanbanState {
            selected_st_line_id: st_line_id,
            current_journal_id: journal_id,
        });
        if let Some(id) = st_line_id {
            self.ctx.emit(BankRecEvent::ScrollToCard(id));
        }
        if let Some(previous) = previous {
            self.ctx.selection().reset(previous);
        }
        info!(
            st_line_id = ?st_line_id.map(|id| id.0),
            journal_id = ?journal_id.map(|id| id.0),
            "selected statement line"
        );
        self.ctx.emit(BankRecEvent::SelectionChanged {
            st_line_id,
            journal_id,
        });

        let init = self.form_init(st_line_id);
        self.ctx
            .bus
            .invoke::<FormMount>(FormMountRequest { st_line_id, init })
            .await
    }

    fn form_init(&self, st_line_id: Option<StLineId>) -> FormInit {
        let snapshot = st_line_id.and_then(|id| {
            self.ctx
                .selection()
                .peek(id)
                .and_then(|state| state.form_restore_data.clone())
        });
        match snapshot {
            Some(snapshot) => FormInit::Restore(snapshot),
            None => FormInit::TriggerMatchingRules,
        }
    }

    pub async fn move_to_next(&self) -> Result<()> {
        let next = self.next_eligible(self.selected_st_line_id(), None);
        self.select(next).await
    }

    /// Called once the open line is reconciled: counts it, refreshes the
    /// page and moves on, scanning the page as it was before the refresh.
    pub async fn on_validated(&self) -> Result<()> {
        let snapshot = self.records();
        let reconciled_count = {
            let mut counter = self.ctx.counter();
            counter.increment();
            counter.reconciled_count()
        };
        info!(reconciled_count, "statement line validated");
        self.ctx
            .emit(BankRecEvent::LineValidated { reconciled_count });

        self.ctx.bus.invoke::<KanbanReload>(true).await?;
        let next = self.next_eligible(self.selected_st_line_id(), Some(&snapshot));
        self.select(next).await
    }

    // Only the most recent reload may publish its page.
    pub async fn reload(&self, deep: bool) -> Result<()> {
        let generation = self.reload_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = self.query();
        let records = self
            .ctx
            .service()
            .load_statement_lines(&query)
            .await
            .context("failed to reload statement lines")?;
        if self.reload_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding stale statement line page");
            return Ok(());
        }

        let count = records.len();
        *lock(&self.records) = records;
        debug!(count, deep, "reloaded statement lines");
        self.ctx.emit(BankRecEvent::LinesReloaded { count, deep });
        if !deep {
            self.ctx.bus.invoke::<KanbanRender>(()).await?;
        }
        Ok(())
    }

    pub async fn on_pager_change(&self, offset: u32, limit: u32) -> Result<()> {
        {
            let mut query = lock(&self.query);
            query.offset = offset;
            query.limit = limit;
        }
        self.reload(true).await?;
        self.keep_or_select_next().await
    }

    pub async fn on_search_model_change(&self, query: StLineQuery) -> Result<()> {
        *lock(&self.query) = query;
        self.reload(true).await?;
        self.keep_or_select_next().await
    }

    async fn keep_or_select_next(&self) -> Result<()> {
        let current = self.selected_st_line_id();
        if current.is_some_and(|id| self.contains(id)) {
            return Ok(());
        }
        let next = self.next_eligible(None, None);
        if next == current {
            return Ok(());
        }
        self.select(next).await
    }
}

/// Scans `snapshot` (or `current`) for the first eligible line after
/// `after`. Falls back to the first line of `current`; `None` only for an
/// empty page.
pub fn next_eligible_st_line(
    current: &[StatementLine],
    after: Option<StLineId>,
    snapshot: Option<&[StatementLine]>,
) -> Option<StLineId> {
    let scanned = snapshot.unwrap_or(current);
    let mut waiting_for_anchor = after.is_some();
    let found = scanned.iter().find(|line| {
        if waiting_for_anchor {
            if Some(line.id) == after {
                waiting_for_anchor = false;
            }
            return false;
        }
        line.is_eligible()
    });
    found
        .map(|line| line.id)
        .or_else(|| current.first().map(|line| line.id))
}

#[cfg(test)]
#[path = "tests/kanban_tests.rs"]
mod tests;
