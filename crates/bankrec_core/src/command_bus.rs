//! Single-slot command channels shared by every pane of a reconciliation session.
//!
//! Each channel holds at most one handler. Registering again replaces the
//! previous handler; dropping the returned [`Registration`] revokes it.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use anyhow::Result;
use futures::future::BoxFuture;
use shared::{
    domain::{RecoModelId, StLineId},
    protocol::ActionRequest,
    todo::TodoCommand,
};
use tracing::{debug, trace};

use crate::lock;

pub trait Channel: 'static {
    type Payload: Send + 'static;
    const NAME: &'static str;
}

macro_rules! channel {
    ($(#[$meta:meta])* $name:ident, $payload:ty, $tag:literal) => {
        $(#[$meta])*
        pub struct $name;

        impl Channel for $name {
            type Payload = $payload;
            const NAME: &'static str = $tag;
        }
    };
}

/// How the editor for a newly selected line should be initialized.
#[derive(Debug, Clone, PartialEq)]
pub enum FormInit {
    TriggerMatchingRules,
    /// Serialized detail record captured before the user navigated away.
    Restore(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormMountRequest {
    pub st_line_id: Option<StLineId>,
    pub init: FormInit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoModelClick {
    pub model_id: RecoModelId,
    pub already_selected: bool,
}

channel!(KanbanMoveToNextLine, (), "kanban-move-to-next-line");
channel!(KanbanValidateStLine, (), "kanban-validate-st-line");
channel!(
    /// Payload is the `deep` flag: a deep reload re-renders everything.
    KanbanReload,
    bool,
    "kanban-reload"
);
channel!(KanbanRender, (), "kanban-render");
channel!(KanbanDoAction, ActionRequest, "kanban-do-action");
channel!(FormMount, FormMountRequest, "form-mount");
channel!(FormTodoCommand, TodoCommand, "form-todo-command");
channel!(FormRecoModelClicked, RecoModelClick, "form-reco-model-clicked");
channel!(
    NotebookActivateManualOpPage,
    (),
    "form-notebook-activate-manual-op-page"
);
channel!(
    NotebookActivateFirstPage,
    (),
    "form-notebook-activate-first-page"
);
channel!(
    NotebookExitManualOpIfActive,
    (),
    "form-notebook-exit-manual-op-if-active"
);
channel!(FormClickedColumn, String, "form-clicked-column");
channel!(GlobalInfoRefresh, (), "globalinfo-refresh");

struct TypedHandler<P>(Box<dyn Fn(P) -> BoxFuture<'static, Result<()>> + Send + Sync>);

struct Slot {
    generation: u64,
    handler: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct BusInner {
    slots: Mutex<HashMap<TypeId, Slot>>,
    next_generation: AtomicU64,
}

#[derive(Clone, Default)]
pub struct CommandBus {
    inner: Arc<BusInner>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C, F, Fut>(&self, handler: F) -> Registration
    where
        C: Channel,
        F: Fn(C::Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let typed: TypedHandler<C::Payload> = TypedHandler(Box::new(
            move |payload: C::Payload| -> BoxFuture<'static, Result<()>> {
                Box::pin(handler(payload))
            },
        ));
        let previous = lock(&self.inner.slots).insert(
            TypeId::of::<C>(),
            Slot {
                generation,
                handler: Arc::new(typed),
            },
        );
        if let Some(previous) = previous {
            debug!(
                channel = C::NAME,
                previous_generation = previous.generation,
                generation,
                "replaced command handler"
            );
        }

        Registration {
            bus: Arc::downgrade(&self.inner),
            key: TypeId::of::<C>(),
            channel: C::NAME,
            generation,
        }
    }

    /// Runs the channel's handler, if any. The registry lock is released
    /// before the handler is awaited so handlers may invoke other channels.
    pub async fn invoke<C: Channel>(&self, payload: C::Payload) -> Result<()> {
        let handler = {
            let slots = lock(&self.inner.slots);
            slots.get(&TypeId::of::<C>()).map(|slot| slot.handler.clone())
        };
        let Some(handler) = handler else {
            trace!(channel = C::NAME, "no handler registered");
            return Ok(());
        };
        let Ok(handler) = handler.downcast::<TypedHandler<C::Payload>>() else {
            return Ok(());
        };
        (handler.0)(payload).await
    }

    pub fn is_registered<C: Channel>(&self) -> bool {
        lock(&self.inner.slots).contains_key(&TypeId::of::<C>())
    }
}

/// Keeps a handler alive in its channel. Dropping it frees the channel,
/// unless a newer handler has taken the slot in the meantime.
#[must_use = "dropping a Registration revokes the handler immediately"]
pub struct Registration {
    bus: Weak<BusInner>,
    key: TypeId,
    channel: &'static str,
    generation: u64,
}

impl Registration {
    pub fn channel(&self) -> &'static str {
        self.channel
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut slots = lock(&bus.slots);
        if slots
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            slots.remove(&self.key);
            debug!(
                channel = self.channel,
                generation = self.generation,
                "revoked command handler"
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/command_bus_tests.rs"]
mod tests;
