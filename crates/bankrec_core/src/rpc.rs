//! JSON-RPC client for an Odoo server exposing the bank reconciliation widget.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use shared::{
    domain::{JournalId, MoveId, StLineId, StatementId},
    error::{ApiException, ErrorCode},
    protocol::{ActionRequest, DetailRecord, GlobalInfo, StLineQuery, StatementLine},
    todo::TodoCommand,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::ReconciliationService;

pub const STATEMENT_LINE_MODEL: &str = "account.bank.statement.line";
pub const WIDGET_MODEL: &str = "bank.rec.widget";

const STATEMENT_LINE_FIELDS: &[&str] = &[
    "id",
    "journal_id",
    "statement_id",
    "move_id",
    "date",
    "payment_ref",
    "partner_id",
    "amount",
    "currency_id",
    "is_reconciled",
    "to_check",
];

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid server url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server error: {0}")]
    Server(#[from] ApiException),
    #[error("unexpected response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<JsonRpcErrorData>,
}

#[derive(Deserialize)]
struct JsonRpcErrorData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

impl JsonRpcError {
    fn into_exception(self) -> ApiException {
        match self.data {
            Some(data) if !data.message.is_empty() => {
                ApiException::new(ErrorCode::from_exception_name(&data.name), data.message)
            }
            Some(data) => {
                ApiException::new(ErrorCode::from_exception_name(&data.name), self.message)
            }
            None => ApiException::new(ErrorCode::Internal, self.message),
        }
    }
}

/// Relational values come back as `[id, display_name]`, a bare id, or
/// `false` when unset.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Many2One {
    Pair(i64, String),
    Id(i64),
    Unset(bool),
}

impl Many2One {
    fn id(&self) -> Option<i64> {
        match self {
            Many2One::Pair(id, _) | Many2One::Id(id) => Some(*id),
            Many2One::Unset(_) => None,
        }
    }

    fn name(&self) -> Option<&str> {
        match self {
            Many2One::Pair(_, name) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Empty char fields are serialized as `false`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OdooText {
    Text(String),
    Unset(bool),
}

impl OdooText {
    fn into_string(self) -> Option<String> {
        match self {
            OdooText::Text(text) => Some(text),
            OdooText::Unset(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatementLineRow {
    id: i64,
    #[serde(default)]
    journal_id: Option<Many2One>,
    #[serde(default)]
    statement_id: Option<Many2One>,
    #[serde(default)]
    move_id: Option<Many2One>,
    date: NaiveDate,
    #[serde(default)]
    payment_ref: Option<OdooText>,
    #[serde(default)]
    partner_id: Option<Many2One>,
    amount: f64,
    #[serde(default)]
    currency_id: Option<Many2One>,
    #[serde(default)]
    is_reconciled: bool,
    #[serde(default)]
    to_check: bool,
}

impl StatementLineRow {
    fn into_line(self) -> Option<StatementLine> {
        let journal_id = self.journal_id.as_ref().and_then(Many2One::id)?;
        Some(StatementLine {
            id: StLineId(self.id),
            journal_id: JournalId(journal_id),
            statement_id: self
                .statement_id
                .as_ref()
                .and_then(Many2One::id)
                .map(StatementId),
            move_id: self.move_id.as_ref().and_then(Many2One::id).map(MoveId),
            move_name: self
                .move_id
                .as_ref()
                .and_then(Many2One::name)
                .unwrap_or_default()
                .to_string(),
            date: self.date,
            payment_ref: self
                .payment_ref
                .and_then(OdooText::into_string)
                .unwrap_or_default(),
            partner_name: self
                .partner_id
                .as_ref()
                .and_then(Many2One::name)
                .map(str::to_string),
            amount: self.amount,
            currency: self
                .currency_id
                .as_ref()
                .and_then(Many2One::name)
                .map(str::to_string),
            is_reconciled: self.is_reconciled,
            to_check: self.to_check,
        })
    }
}

pub fn statement_line_domain(query: &StLineQuery) -> Value {
    let mut domain = Vec::new();
    if let Some(journal_id) = query.journal_id {
        domain.push(json!(["journal_id", "=", journal_id]));
    }
    if let Some(statement_id) = query.statement_id {
        domain.push(json!(["statement_id", "=", statement_id]));
    }
    if !query.st_line_ids.is_empty() {
        domain.push(json!(["id", "in", query.st_line_ids]));
    }
    if query.not_matched {
        domain.push(json!(["is_reconciled", "=", false]));
    }
    if query.to_check {
        domain.push(json!(["to_check", "=", true]));
    }
    if let Some(text) = query.search_text.as_deref().filter(|text| !text.is_empty()) {
        domain.push(json!(["payment_ref", "ilike", text]));
    }
    Value::Array(domain)
}

pub struct OdooRpcService {
    http: Client,
    server_url: String,
    next_id: AtomicU64,
}

impl OdooRpcService {
    pub fn new(server_url: &str) -> Result<Self, RpcError> {
        let parsed = Url::parse(server_url).map_err(|source| RpcError::InvalidUrl {
            url: server_url.to_string(),
            source,
        })?;
        let http = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|source| RpcError::Transport {
                endpoint: server_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            server_url: parsed.as_str().trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Opens a web session. The session cookie is kept by the client and
    /// sent with every later call.
    pub async fn authenticate(
        &self,
        database: &str,
        login: &str,
        password: &str,
    ) -> Result<i64, RpcError> {
        let path = "/web/session/authenticate";
        let result = self
            .post(
                path,
                json!({"db": database, "login": login, "password": password}),
            )
            .await?;
        let uid = result
            .get("uid")
            .and_then(Value::as_i64)
            .ok_or_else(|| RpcError::Malformed {
                endpoint: path.to_string(),
                detail: "authentication returned no uid".to_string(),
            })?;
        info!(uid, database, "authenticated");
        Ok(uid)
    }

    pub async fn call_kw<T: DeserializeOwned>(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<T, RpcError> {
        let path = format!("/web/dataset/call_kw/{model}/{method}");
        debug!(model, method, "calling server");
        let result = self
            .post(
                &path,
                json!({"model": model, "method": method, "args": args, "kwargs": kwargs}),
            )
            .await?;
        serde_json::from_value(result).map_err(|error| RpcError::Malformed {
            endpoint: path,
            detail: error.to_string(),
        })
    }

    async fn post(&self, path: &str, params: Value) -> Result<Value, RpcError> {
        let endpoint = format!("{}{}", self.server_url, path);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let transport = |source: reqwest::Error| RpcError::Transport {
            endpoint: endpoint.clone(),
            source,
        };
        let response: JsonRpcResponse = self
            .http
            .post(&endpoint)
            .json(&json!({"jsonrpc": "2.0", "method": "call", "params": params, "id": id}))
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;

        if let Some(error) = response.error {
            let exception = error.into_exception();
            warn!(%endpoint, code = ?exception.code, message = %exception.message, "server rejected call");
            return Err(exception.into());
        }
        Ok(response.result)
    }
}

#[async_trait]
impl ReconciliationService for OdooRpcService {
    async fn load_statement_lines(&self, query: &StLineQuery) -> Result<Vec<StatementLine>> {
        let rows: Vec<StatementLineRow> = self
            .call_kw(
                STATEMENT_LINE_MODEL,
                "search_read",
                json!([]),
                json!({
                    "domain": statement_line_domain(query),
                    "fields": STATEMENT_LINE_FIELDS,
                    "offset": query.offset,
                    "limit": query.limit,
                }),
            )
            .await?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match row.into_line() {
                Some(line) => lines.push(line),
                None => warn!(st_line_id = id, "skipping statement line without journal"),
            }
        }
        Ok(lines)
    }

    async fn load_detail_record(
        &self,
        st_line_id: StLineId,
        initial_command: Option<&TodoCommand>,
    ) -> Result<DetailRecord> {
        Ok(self
            .call_kw(
                WIDGET_MODEL,
                "load_detail_record",
                json!([st_line_id]),
                json!({"todo_command": initial_command.map(ToString::to_string)}),
            )
            .await?)
    }

    async fn apply_todo_command(
        &self,
        record: &DetailRecord,
        command: &TodoCommand,
    ) -> Result<DetailRecord> {
        Ok(self
            .call_kw(
                WIDGET_MODEL,
                "apply_todo_command",
                json!([record, command.to_string()]),
                json!({}),
            )
            .await?)
    }

    async fn collect_global_info(&self, journal_id: Option<JournalId>) -> Result<GlobalInfo> {
        Ok(self
            .call_kw(
                WIDGET_MODEL,
                "collect_global_info_data",
                json!([journal_id]),
                json!({}),
            )
            .await?)
    }

    async fn open_reconciliation_report(
        &self,
        journal_id: Option<JournalId>,
    ) -> Result<ActionRequest> {
        Ok(self
            .call_kw(
                WIDGET_MODEL,
                "action_open_bank_reconciliation_report",
                json!([journal_id]),
                json!({}),
            )
            .await?)
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
