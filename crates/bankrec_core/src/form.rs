//! Detail editor for the statement line selected in the list.
//!
//! [`FormHost`] owns the editor slot and swaps controllers when the list
//! selects another line. [`FormController`] turns user gestures into todo
//! commands, replaces its record with whatever the server returns, and maps
//! the server's `next_action_todo` directive onto bus commands.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use anyhow::{Context, Result};
use shared::{
    domain::{AmlId, LineIndex, MoveId, RecoModelId, StLineId},
    protocol::{DetailRecord, NextActionTodo},
    todo::{FormButton, TodoCommand},
};
use tracing::{debug, info, warn};

use crate::{
    bind,
    command_bus::{
        FormClickedColumn, FormInit, FormMount, FormMountRequest, FormRecoModelClicked,
        FormTodoCommand, GlobalInfoRefresh, KanbanDoAction, KanbanMoveToNextLine, KanbanReload,
        KanbanValidateStLine, NotebookActivateFirstPage, NotebookActivateManualOpPage,
        NotebookExitManualOpIfActive, RecoModelClick, Registration,
    },
    lock,
    notebook::{Notebook, NotebookPage},
    panes::{AmlsMatcherPane, RecoModelsPane},
    BankRecContext, BankRecEvent,
};

pub struct FormHost {
    ctx: Arc<BankRecContext>,
    current: Mutex<Option<Arc<FormController>>>,
    mount_generation: AtomicU64,
    registration: Mutex<Option<Registration>>,
}

impl FormHost {
    pub fn new(ctx: Arc<BankRecContext>) -> Arc<Self> {
        let host = Arc::new(Self {
            ctx: ctx.clone(),
            current: Mutex::new(None),
            mount_generation: AtomicU64::new(0),
            registration: Mutex::new(None),
        });
        let registration = ctx.bus.register::<FormMount, _, _>(bind(
            &host,
            |host, request: FormMountRequest| async move { host.mount(request).await },
        ));
        *lock(&host.registration) = Some(registration);
        host
    }

    pub fn current(&self) -> Option<Arc<FormController>> {
        lock(&self.current).clone()
    }

    /// Replaces the open editor. When selections overlap only the latest one
    /// gets installed.
    pub async fn mount(&self, request: FormMountRequest) -> Result<()> {
        let generation = self.mount_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = lock(&self.current).take();
        drop(previous);

        let Some(st_line_id) = request.st_line_id else {
            debug!("no statement line to edit");
            return Ok(());
        };
        let form = FormController::load(self.ctx.clone(), st_line_id, request.init).await?;
        if self.mount_generation.load(Ordering::SeqCst) != generation {
            debug!(%st_line_id, "discarding editor superseded by a newer selection");
            return Ok(());
        }
        *lock(&self.current) = Some(form.clone());
        form.attach().await
    }
}

pub struct FormController {
    ctx: Arc<BankRecContext>,
    st_line_id: StLineId,
    record: Mutex<DetailRecord>,
    notebook: Mutex<Notebook>,
    command_generation: AtomicU64,
    buttons_disabled: AtomicBool,
    amls: AmlsMatcherPane,
    reco_models: RecoModelsPane,
    registrations: Mutex<Vec<Registration>>,
}

impl FormController {
    pub async fn mount(
        ctx: Arc<BankRecContext>,
        st_line_id: StLineId,
        init: FormInit,
    ) -> Result<Arc<Self>> {
        let form = Self::load(ctx, st_line_id, init).await?;
        form.attach().await?;
        Ok(form)
    }

    pub async fn load(
        ctx: Arc<BankRecContext>,
        st_line_id: StLineId,
        init: FormInit,
    ) -> Result<Arc<Self>> {
        let record = match init {
            FormInit::Restore(snapshot) => match serde_json::from_str::<DetailRecord>(&snapshot) {
                Ok(record) if record.st_line_id == st_line_id => {
                    debug!(%st_line_id, "restored editor from snapshot");
                    record
                }
                Ok(record) => {
                    warn!(
                        %st_line_id,
                        snapshot_st_line_id = %record.st_line_id,
                        "snapshot belongs to another line, reloading"
                    );
                    Self::fetch(&ctx, st_line_id).await?
                }
                Err(error) => {
                    warn!(%st_line_id, %error, "unreadable editor snapshot, reloading");
                    Self::fetch(&ctx, st_line_id).await?
                }
            },
            FormInit::TriggerMatchingRules => Self::fetch(&ctx, st_line_id).await?,
        };

        Ok(Arc::new(Self {
            amls: AmlsMatcherPane::mount(ctx.clone(), st_line_id),
            reco_models: RecoModelsPane::new(ctx.clone()),
            ctx,
            st_line_id,
            record: Mutex::new(record),
            notebook: Mutex::new(Notebook::default()),
            command_generation: AtomicU64::new(0),
            buttons_disabled: AtomicBool::new(false),
            registrations: Mutex::new(Vec::new()),
        }))
    }

    async fn fetch(ctx: &BankRecContext, st_line_id: StLineId) -> Result<DetailRecord> {
        ctx.set_loading(st_line_id, true);
        let result = ctx
            .service()
            .load_detail_record(st_line_id, Some(&TodoCommand::TriggerMatchingRules))
            .await
            .with_context(|| format!("failed to load statement line {st_line_id}"));
        ctx.set_loading(st_line_id, false);
        result
    }

    pub async fn attach(self: &Arc<Self>) -> Result<()> {
        self.register_commands();
        info!(st_line_id = %self.st_line_id, "mounted statement line in editor");
        self.publish_record();
        self.on_record_changed().await
    }

    fn register_commands(self: &Arc<Self>) {
        let bus = &self.ctx.bus;
        let registrations = vec![
            bus.register::<FormTodoCommand, _, _>(bind(
                self,
                |form, command: TodoCommand| async move { form.execute(command).await },
            )),
            bus.register::<FormRecoModelClicked, _, _>(bind(
                self,
                |form, click: RecoModelClick| async move {
                    if click.already_selected {
                        form.unapply_reconciliation_model(click.model_id).await
                    } else {
                        form.apply_reconciliation_model(click.model_id).await
                    }
                },
            )),
            bus.register::<NotebookActivateManualOpPage, _, _>(bind(self, |form, ()| async move {
                form.show_page(NotebookPage::ManualOperations);
                Ok(())
            })),
            bus.register::<NotebookActivateFirstPage, _, _>(bind(self, |form, ()| async move {
                form.show_page(NotebookPage::Matching);
                Ok(())
            })),
            bus.register::<NotebookExitManualOpIfActive, _, _>(bind(self, |form, ()| async move {
                form.exit_manual_operations();
                Ok(())
            })),
            bus.register::<FormClickedColumn, _, _>(bind(
                self,
                |form, column: String| async move {
                    form.focus_column(&column);
                    Ok(())
                },
            )),
        ];
        *lock(&self.registrations) = registrations;
    }

    pub fn st_line_id(&self) -> StLineId {
        self.st_line_id
    }

    pub fn record(&self) -> DetailRecord {
        lock(&self.record).clone()
    }

    pub fn notebook_page(&self) -> NotebookPage {
        lock(&self.notebook).page()
    }

    pub fn buttons_disabled(&self) -> bool {
        self.buttons_disabled.load(Ordering::SeqCst)
    }

    pub fn amls_pane(&self) -> &AmlsMatcherPane {
        &self.amls
    }

    pub fn reco_models_pane(&self) -> &RecoModelsPane {
        &self.reco_models
    }

    fn publish_record(&self) {
        let state = lock(&self.record).state;
        self.ctx.emit(BankRecEvent::DetailRecordUpdated {
            st_line_id: self.st_line_id,
            state,
        });
    }

    pub async fn execute(&self, command: TodoCommand) -> Result<()> {
        let current = self.record();
        if command.is_edit() && current.is_reconciled() {
            debug!(
                st_line_id = %self.st_line_id,
                %command,
                "ignoring edit of a reconciled line"
            );
            return Ok(());
        }

        let generation = self.command_generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(st_line_id = %self.st_line_id, %command, "sending todo command");
        let updated = self
            .ctx
            .service()
            .apply_todo_command(&current, &command)
            .await
            .with_context(|| {
                format!(
                    "todo command '{command}' failed for statement line {}",
                    self.st_line_id
                )
            })?;
        if self.command_generation.load(Ordering::SeqCst) != generation {
            debug!(
                st_line_id = %self.st_line_id,
                %command,
                "discarding response overtaken by a newer command"
            );
            return Ok(());
        }

        *lock(&self.record) = updated;
        self.publish_record();
        self.on_record_changed().await
    }

    async fn on_record_changed(&self) -> Result<()> {
        let mut record = self.record();
        let selection_changed = self
            .ctx
            .selection()
            .set_selected_aml_ids(self.st_line_id, record.selected_aml_ids.iter().copied());
        if selection_changed {
            debug!(
                st_line_id = %self.st_line_id,
                selected = record.selected_aml_ids.len(),
                "matched journal items changed"
            );
        }

        let directive = record.next_action_todo.take();
        match serde_json::to_string(&record) {
            Ok(snapshot) => self
                .ctx
                .selection()
                .set_form_restore_data(self.st_line_id, snapshot),
            Err(error) => warn!(st_line_id = %self.st_line_id, %error, "cannot snapshot editor"),
        }

        match directive {
            Some(directive) if directive.is_liquidity_refresh() => {
                self.handle_server_directive(directive).await
            }
            _ => Ok(()),
        }
    }

    /// Performs the UI transition the server asked for after a command.
    /// Only navigation actions are honored once the list has moved to
    /// another line.
    pub async fn handle_server_directive(&self, directive: NextActionTodo) -> Result<()> {
        let is_action = matches!(
            directive,
            NextActionTodo::ClientAction(_) | NextActionTodo::WindowAction(_)
        );
        if !is_action && !self.is_open() {
            debug!(
                st_line_id = %self.st_line_id,
                selected = ?self.ctx.kanban_state().selected_st_line_id.map(|id| id.0),
                ?directive,
                "skipping directive of a line that is no longer open"
            );
            lock(&self.record).next_action_todo = None;
            return Ok(());
        }

        debug!(st_line_id = %self.st_line_id, ?directive, "handling server directive");
        match &directive {
            NextActionTodo::ClientAction(_) | NextActionTodo::WindowAction(_) => {
                if let Some(action) = directive.to_action() {
                    self.ctx.bus.invoke::<KanbanDoAction>(action).await?;
                }
            }
            NextActionTodo::ReconcileStLine => self.action_validate().await?,
            NextActionTodo::ResetForm => {
                self.ctx.bus.invoke::<NotebookActivateFirstPage>(()).await?;
                self.refresh_st_line_data().await?;
            }
            NextActionTodo::MoveToNext => {
                self.refresh_st_line_data().await?;
                self.ctx.bus.invoke::<KanbanMoveToNextLine>(()).await?;
            }
            NextActionTodo::RefreshLiquidityBalance => {
                self.refresh_st_line_data().await?;
                self.ctx.bus.invoke::<GlobalInfoRefresh>(()).await?;
            }
            NextActionTodo::RefreshLiquidity | NextActionTodo::RefreshStatementLine => {
                self.refresh_st_line_data().await?;
            }
            NextActionTodo::Unknown => {
                debug!(st_line_id = %self.st_line_id, "ignoring unknown directive");
            }
        }

        let mut record = lock(&self.record);
        if record.next_action_todo.as_ref() == Some(&directive) {
            record.next_action_todo = None;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.ctx.kanban_state().selected_st_line_id == Some(self.st_line_id)
    }

    async fn action_validate(&self) -> Result<()> {
        self.ctx.set_loading(self.st_line_id, true);
        let result = self.ctx.bus.invoke::<KanbanValidateStLine>(()).await;
        self.ctx.set_loading(self.st_line_id, false);
        result
    }

    async fn refresh_st_line_data(&self) -> Result<()> {
        self.ctx.set_loading(self.st_line_id, true);
        let result = self.ctx.bus.invoke::<KanbanReload>(false).await;
        self.ctx.set_loading(self.st_line_id, false);
        result
    }

    pub async fn mount_line(&self, index: LineIndex, clicked_column: Option<String>) -> Result<()> {
        let record = self.record();
        if record.is_reconciled() {
            debug!(st_line_id = %self.st_line_id, %index, "reconciled line cannot be edited");
            return Ok(());
        }
        if record.form_index.as_ref() != Some(&index) {
            self.execute(TodoCommand::MountLineInEdit(index)).await?;
            self.ctx
                .bus
                .invoke::<NotebookActivateManualOpPage>(())
                .await?;
        }
        if let Some(column) = clicked_column {
            self.ctx.bus.invoke::<FormClickedColumn>(column).await?;
        }
        Ok(())
    }

    pub async fn remove_line(&self, index: LineIndex) -> Result<()> {
        if self.record().is_reconciled() {
            return Ok(());
        }
        self.execute(TodoCommand::RemoveLine(index)).await?;
        self.ctx
            .bus
            .invoke::<NotebookExitManualOpIfActive>(())
            .await
    }

    pub async fn add_matched_entry(&self, aml_id: AmlId) -> Result<()> {
        self.execute(TodoCommand::AddNewAmls(vec![aml_id])).await
    }

    pub async fn remove_matched_entry(&self, aml_id: AmlId) -> Result<()> {
        self.execute(TodoCommand::RemoveNewAmls(vec![aml_id])).await
    }

    pub async fn apply_reconciliation_model(&self, model_id: RecoModelId) -> Result<()> {
        if self.record().is_reconciled() {
            return Ok(());
        }
        self.execute(TodoCommand::SelectReconcileModelButton(model_id))
            .await?;
        let last = self.record().lines_widget.last_index().cloned();
        if let Some(last) = last {
            self.execute(TodoCommand::MountLineInEdit(last)).await?;
        }
        Ok(())
    }

    pub async fn unapply_reconciliation_model(&self, model_id: RecoModelId) -> Result<()> {
        self.execute(TodoCommand::UnselectReconcileModelButton(model_id))
            .await
    }

    /// Clicks while a previous one is still running are ignored.
    pub async fn click_button(&self, button: FormButton) -> Result<()> {
        if self.buttons_disabled.swap(true, Ordering::SeqCst) {
            debug!(st_line_id = %self.st_line_id, button = button.name(), "buttons are disabled");
            return Ok(());
        }
        let result = self.run_button(button).await;
        self.buttons_disabled.store(false, Ordering::SeqCst);
        result
    }

    async fn run_button(&self, button: FormButton) -> Result<()> {
        info!(st_line_id = %self.st_line_id, button = button.name(), "button clicked");
        self.execute(TodoCommand::ButtonClicked(button)).await?;
        let directive = self.record().next_action_todo;
        match directive {
            Some(directive) => self.handle_server_directive(directive).await,
            None => Ok(()),
        }
    }

    pub async fn show_move(&self, move_id: MoveId) -> Result<()> {
        self.execute(TodoCommand::ButtonClicked(FormButton::RedirectToMoveForm(
            move_id,
        )))
        .await?;
        let action = {
            let mut record = lock(&self.record);
            let action = record.next_action_todo.as_ref().and_then(NextActionTodo::to_action);
            if action.is_some() {
                record.next_action_todo = None;
            }
            action
        };
        match action {
            Some(action) => self.ctx.bus.invoke::<KanbanDoAction>(action).await,
            None => Ok(()),
        }
    }

    /// Tab click. Leaving manual operations closes the edit form; entering
    /// it opens the last proposed line.
    pub async fn activate_page(&self, page: NotebookPage) -> Result<()> {
        self.show_page(page);
        let record = self.record();
        if record.is_reconciled() {
            return Ok(());
        }
        match page {
            NotebookPage::ManualOperations => match record.lines_widget.last_index() {
                Some(last) => {
                    self.execute(TodoCommand::MountLineInEdit(last.clone()))
                        .await
                }
                None => Ok(()),
            },
            NotebookPage::Matching if record.form_index.is_some() => {
                self.execute(TodoCommand::ClearEditForm).await
            }
            NotebookPage::Matching => Ok(()),
        }
    }

    fn show_page(&self, page: NotebookPage) {
        let (changed, focus) = {
            let mut notebook = lock(&self.notebook);
            let changed = notebook.switch_to(page);
            (changed, notebook.take_pending_focus())
        };
        if changed {
            self.ctx.emit(BankRecEvent::NotebookPageChanged(page));
        }
        if let Some(field) = focus {
            self.ctx.emit(BankRecEvent::FocusField(field));
        }
    }

    fn exit_manual_operations(&self) {
        let changed = lock(&self.notebook).exit_manual_operations();
        if changed {
            self.ctx
                .emit(BankRecEvent::NotebookPageChanged(NotebookPage::Matching));
        }
    }

    fn focus_column(&self, column: &str) {
        let field = lock(&self.notebook).request_focus(column);
        if let Some(field) = field {
            self.ctx.emit(BankRecEvent::FocusField(field));
        }
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
