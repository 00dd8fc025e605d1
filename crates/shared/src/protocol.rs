use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    AccountId, AmlId, JournalId, LineFlag, LineIndex, MoveId, PartnerId, RecoModelId,
    RecordState, StLineId, StLineStatus, StatementId, TaxId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub id: StLineId,
    pub journal_id: JournalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<StatementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_id: Option<MoveId>,
    #[serde(default)]
    pub move_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub payment_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub is_reconciled: bool,
    #[serde(default)]
    pub to_check: bool,
}

impl StatementLine {
    pub fn status(&self) -> StLineStatus {
        if self.to_check {
            StLineStatus::ToCheck
        } else if self.is_reconciled {
            StLineStatus::Reconciled
        } else {
            StLineStatus::Unreconciled
        }
    }

    pub fn is_eligible(&self) -> bool {
        !self.is_reconciled || self.to_check
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedLine {
    pub index: LineIndex,
    pub flag: LineFlag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<PartnerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount_currency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_ids: Vec<TaxId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_base_amount_currency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_aml_id: Option<AmlId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_id: Option<MoveId>,
}

impl ProposedLine {
    pub fn debit(&self) -> f64 {
        self.balance.max(0.0)
    }

    pub fn credit(&self) -> f64 {
        (-self.balance).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinesWidget {
    #[serde(default)]
    pub lines: Vec<ProposedLine>,
    #[serde(default)]
    pub display_multi_currency_column: bool,
    #[serde(default)]
    pub display_taxes_column: bool,
    #[serde(default)]
    pub display_analytic_account_column: bool,
}

impl LinesWidget {
    pub fn line(&self, index: &LineIndex) -> Option<&ProposedLine> {
        self.lines.iter().find(|line| &line.index == index)
    }

    pub fn last_index(&self) -> Option<&LineIndex> {
        self.lines.last().map(|line| &line.index)
    }

    pub fn liquidity_line(&self) -> Option<&ProposedLine> {
        self.lines
            .iter()
            .find(|line| line.flag == LineFlag::Liquidity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoModelButton {
    pub id: RecoModelId,
    pub name: String,
    #[serde(default)]
    pub selected: bool,
}

/// The full proposal for one statement line, as computed by the server.
/// Every mutation returns a new one; the client never patches it locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub st_line_id: StLineId,
    pub journal_id: JournalId,
    #[serde(default)]
    pub state: RecordState,
    #[serde(default)]
    pub to_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_index: Option<LineIndex>,
    #[serde(default)]
    pub lines_widget: LinesWidget,
    #[serde(default)]
    pub reco_models_widget: Vec<RecoModelButton>,
    #[serde(default)]
    pub selected_aml_ids: Vec<AmlId>,
    #[serde(
        default,
        deserialize_with = "empty_directive_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_action_todo: Option<NextActionTodo>,
}

impl DetailRecord {
    pub fn is_reconciled(&self) -> bool {
        self.state.is_reconciled()
    }
}

fn empty_directive_as_none<'de, D>(deserializer: D) -> Result<Option<NextActionTodo>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    match raw {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionParams(pub Map<String, Value>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextActionTodo {
    ReconcileStLine,
    ResetForm,
    MoveToNext,
    RefreshLiquidity,
    RefreshLiquidityBalance,
    RefreshStatementLine,
    #[serde(rename = "ir.actions.client", alias = "client_action")]
    ClientAction(ActionParams),
    #[serde(rename = "ir.actions.act_window", alias = "window_action")]
    WindowAction(ActionParams),
    #[serde(other)]
    Unknown,
}

impl NextActionTodo {
    pub fn is_liquidity_refresh(&self) -> bool {
        matches!(
            self,
            NextActionTodo::RefreshLiquidity | NextActionTodo::RefreshLiquidityBalance
        )
    }

    pub fn to_action(&self) -> Option<ActionRequest> {
        match self {
            NextActionTodo::ClientAction(params) => Some(ActionRequest {
                kind: ActionRequest::CLIENT.to_string(),
                params: params.0.clone(),
            }),
            NextActionTodo::WindowAction(params) => Some(ActionRequest {
                kind: ActionRequest::WINDOW.to_string(),
                params: params.0.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ActionRequest {
    pub const CLIENT: &'static str = "ir.actions.client";
    pub const WINDOW: &'static str = "ir.actions.act_window";

    pub fn window(params: Map<String, Value>) -> Self {
        Self {
            kind: Self::WINDOW.to_string(),
            params,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_amount_currency: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StLineQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_id: Option<JournalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<StatementId>,
    /// Restricts the list to explicit lines ("Match"/"View" from the list view).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub st_line_ids: Vec<StLineId>,
    #[serde(default)]
    pub not_matched: bool,
    #[serde(default)]
    pub to_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    80
}

impl Default for StLineQuery {
    fn default() -> Self {
        Self {
            journal_id: None,
            statement_id: None,
            st_line_ids: Vec::new(),
            not_matched: false,
            to_check: false,
            search_text: None,
            offset: 0,
            limit: default_limit(),
        }
    }
}

impl StLineQuery {
    pub fn for_journal(journal_id: JournalId) -> Self {
        Self {
            journal_id: Some(journal_id),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, offset: u32, limit: u32) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
