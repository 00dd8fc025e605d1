use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotebookPage {
    #[default]
    Matching,
    ManualOperations,
}

/// Tab state of the editor plus a column focus deferred until the manual
/// operations page is shown.
#[derive(Debug, Default)]
pub struct Notebook {
    page: NotebookPage,
    pending_focus: Option<String>,
}

impl Notebook {
    pub fn page(&self) -> NotebookPage {
        self.page
    }

    pub fn switch_to(&mut self, page: NotebookPage) -> bool {
        if self.page == page {
            return false;
        }
        self.page = page;
        true
    }

    pub fn exit_manual_operations(&mut self) -> bool {
        self.page == NotebookPage::ManualOperations && self.switch_to(NotebookPage::Matching)
    }

    /// Field to focus right away, if the edit form is visible. Otherwise the
    /// column is kept for [`Notebook::take_pending_focus`].
    pub fn request_focus(&mut self, column: &str) -> Option<String> {
        let field = field_for_column(column).to_string();
        if self.page == NotebookPage::ManualOperations {
            self.pending_focus = None;
            Some(field)
        } else {
            self.pending_focus = Some(field);
            None
        }
    }

    pub fn take_pending_focus(&mut self) -> Option<String> {
        if self.page == NotebookPage::ManualOperations {
            self.pending_focus.take()
        } else {
            None
        }
    }
}

/// Debit and credit columns are both edited through the balance field.
pub fn field_for_column(column: &str) -> &str {
    match column {
        "debit" | "credit" => "balance",
        other => other,
    }
}
