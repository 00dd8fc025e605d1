use super::*;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use shared::domain::{LineIndex, RecordState};
use tokio::net::TcpListener;

use crate::lock;

#[derive(Debug, Clone)]
struct RecordedCall {
    model: String,
    method: String,
    params: Value,
    cookie: Option<String>,
}

#[derive(Clone, Default)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

fn ok(id: &Value, result: Value) -> Json<Value> {
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn handle_authenticate(Json(body): Json<Value>) -> impl IntoResponse {
    let params = &body["params"];
    if params["password"] != json!("admin") {
        return (
            [(header::SET_COOKIE, "session_id=; Path=/")],
            Json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": {
                    "code": 200,
                    "message": "Odoo Server Error",
                    "data": {"name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}
                }
            })),
        );
    }
    (
        [(header::SET_COOKIE, "session_id=s3cr3t; Path=/")],
        ok(&body["id"], json!({"uid": 2, "db": params["db"]})),
    )
}

async fn handle_call_kw(
    State(state): State<MockState>,
    Path((model, method)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let params = body["params"].clone();
    lock(&state.calls).push(RecordedCall {
        model: model.clone(),
        method: method.clone(),
        params: params.clone(),
        cookie: headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    });

    let result = match method.as_str() {
        "search_read" => json!([
            {
                "id": 5,
                "journal_id": [1, "Bank"],
                "statement_id": false,
                "move_id": [40, "BNK1/2024/00005"],
                "date": "2024-01-15",
                "payment_ref": "INV/2024/0001",
                "partner_id": [9, "Azure Interior"],
                "amount": 150.0,
                "currency_id": [2, "USD"],
                "is_reconciled": false,
                "to_check": false
            },
            {
                "id": 6,
                "journal_id": 1,
                "statement_id": [3, "Statement 3"],
                "move_id": [41, "BNK1/2024/00006"],
                "date": "2024-01-16",
                "payment_ref": false,
                "partner_id": false,
                "amount": -20.0,
                "currency_id": false,
                "is_reconciled": true,
                "to_check": true
            },
            {
                "id": 7,
                "journal_id": false,
                "date": "2024-01-17",
                "amount": 1.0
            }
        ]),
        "load_detail_record" => json!({
            "st_line_id": params["args"][0],
            "journal_id": 1,
            "state": "invalid",
            "lines_widget": {"lines": [
                {"index": "0", "flag": "liquidity", "balance": 150.0}
            ]},
            "next_action_todo": false
        }),
        "apply_todo_command" => {
            let mut record = params["args"][0].clone();
            record["form_index"] = json!("0");
            record["next_action_todo"] = json!({"type": "refresh_liquidity"});
            record
        }
        "collect_global_info_data" => json!({"balance_amount": "$ 1,000.00", "nb_to_check": 2}),
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": {
                    "code": 200,
                    "message": "Odoo Server Error",
                    "data": {
                        "name": "odoo.exceptions.AccessError",
                        "message": format!("{model}.{method} is not allowed")
                    }
                }
            }));
        }
    };
    ok(&body["id"], result)
}

async fn spawn_odoo() -> anyhow::Result<(String, MockState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MockState::default();
    let app = Router::new()
        .route("/web/session/authenticate", post(handle_authenticate))
        .route("/web/dataset/call_kw/:model/:method", post(handle_call_kw))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[test]
fn domain_follows_the_query() {
    let query = StLineQuery {
        journal_id: Some(JournalId(1)),
        st_line_ids: vec![StLineId(4), StLineId(5)],
        not_matched: true,
        search_text: Some("INV".into()),
        ..StLineQuery::default()
    };
    assert_eq!(
        statement_line_domain(&query),
        json!([
            ["journal_id", "=", 1],
            ["id", "in", [4, 5]],
            ["is_reconciled", "=", false],
            ["payment_ref", "ilike", "INV"]
        ])
    );
    assert_eq!(statement_line_domain(&StLineQuery::default()), json!([]));
}

#[test]
fn rejects_an_invalid_server_url() {
    let err = OdooRpcService::new("not a url").err().expect("must fail");
    assert!(matches!(err, RpcError::InvalidUrl { .. }));
}

#[tokio::test]
async fn statement_lines_are_read_with_relational_names() {
    let (server_url, state) = spawn_odoo().await.expect("spawn server");
    let service = OdooRpcService::new(&server_url).expect("client");

    let lines = service
        .load_statement_lines(&StLineQuery::for_journal(JournalId(1)).with_page(80, 40))
        .await
        .expect("lines");

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].id, StLineId(5));
    assert_eq!(lines[0].move_name, "BNK1/2024/00005");
    assert_eq!(lines[0].partner_name.as_deref(), Some("Azure Interior"));
    assert_eq!(lines[0].currency.as_deref(), Some("USD"));
    assert_eq!(lines[1].statement_id, Some(StatementId(3)));
    assert_eq!(lines[1].payment_ref, "");
    assert!(lines[1].to_check);

    let calls = lock(&state.calls).clone();
    assert_eq!(calls[0].model, STATEMENT_LINE_MODEL);
    assert_eq!(calls[0].method, "search_read");
    let kwargs = &calls[0].params["kwargs"];
    assert_eq!(kwargs["domain"], json!([["journal_id", "=", 1]]));
    assert_eq!(kwargs["offset"], json!(80));
    assert_eq!(kwargs["limit"], json!(40));
}

#[tokio::test]
async fn todo_commands_travel_in_their_wire_encoding() {
    let (server_url, state) = spawn_odoo().await.expect("spawn server");
    let service = OdooRpcService::new(&server_url).expect("client");

    let record = service
        .load_detail_record(StLineId(5), Some(&TodoCommand::TriggerMatchingRules))
        .await
        .expect("record");
    assert_eq!(record.st_line_id, StLineId(5));
    assert_eq!(record.state, RecordState::Invalid);
    assert_eq!(record.next_action_todo, None);

    let updated = service
        .apply_todo_command(&record, &TodoCommand::MountLineInEdit(LineIndex::new("0")))
        .await
        .expect("apply");
    assert_eq!(updated.form_index, Some(LineIndex::new("0")));
    assert_eq!(
        updated.next_action_todo,
        Some(shared::protocol::NextActionTodo::RefreshLiquidity)
    );

    let calls = lock(&state.calls).clone();
    assert_eq!(calls[0].model, WIDGET_MODEL);
    assert_eq!(calls[0].params["args"], json!([5]));
    assert_eq!(
        calls[0].params["kwargs"]["todo_command"],
        json!("trigger_matching_rules")
    );
    assert_eq!(calls[1].method, "apply_todo_command");
    assert_eq!(calls[1].params["args"][1], json!("mount_line_in_edit,0"));
    assert_eq!(calls[1].params["args"][0]["st_line_id"], json!(5));
}

#[tokio::test]
async fn global_info_keeps_unknown_fields() {
    let (server_url, _state) = spawn_odoo().await.expect("spawn server");
    let service = OdooRpcService::new(&server_url).expect("client");

    let info = service
        .collect_global_info(Some(JournalId(1)))
        .await
        .expect("info");

    assert_eq!(info.balance_amount.as_deref(), Some("$ 1,000.00"));
    assert_eq!(info.extra.get("nb_to_check"), Some(&json!(2)));
}

#[tokio::test]
async fn server_errors_carry_their_code() {
    let (server_url, _state) = spawn_odoo().await.expect("spawn server");
    let service = OdooRpcService::new(&server_url).expect("client");

    let err = service
        .open_reconciliation_report(Some(JournalId(1)))
        .await
        .expect_err("must fail");

    match err.downcast_ref::<RpcError>() {
        Some(RpcError::Server(exception)) => {
            assert_eq!(exception.code, ErrorCode::AccessDenied);
            assert!(exception.message.contains("is not allowed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn session_cookie_is_sent_after_authentication() {
    let (server_url, state) = spawn_odoo().await.expect("spawn server");
    let service = OdooRpcService::new(&server_url).expect("client");

    let err = service
        .authenticate("bank", "admin", "wrong")
        .await
        .expect_err("bad password");
    assert!(matches!(
        err,
        RpcError::Server(ApiException {
            code: ErrorCode::AccessDenied,
            ..
        })
    ));

    let uid = service
        .authenticate("bank", "admin", "admin")
        .await
        .expect("login");
    assert_eq!(uid, 2);

    service
        .collect_global_info(None)
        .await
        .expect("info");
    let calls = lock(&state.calls).clone();
    assert!(calls[0]
        .cookie
        .as_deref()
        .is_some_and(|cookie| cookie.contains("session_id=s3cr3t")));
}
