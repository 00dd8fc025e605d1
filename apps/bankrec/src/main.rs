use std::{collections::HashSet, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bankrec_core::{
    ActionDispatcher, BankRecContext, BankRecSession, KanbanOptions, OdooRpcService,
    ReconciliationService,
};
use clap::{Parser, Subcommand};
use shared::{
    domain::{JournalId, RecoModelId, RecordState, StLineId},
    protocol::{ActionRequest, DetailRecord, StLineQuery},
    todo::{FormButton, TodoCommand},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "bankrec", about = "Reconcile bank statement lines against an Odoo server")]
struct Cli {
    /// TOML settings file; defaults to ./bankrec.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    journal_id: Option<i64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the first page of statement lines. Lines still to reconcile are starred.
    Lines,
    /// Print the journal balance summary.
    Info,
    /// Validate the selected line and every following balanced one.
    AutoValidate {
        #[arg(long)]
        max: Option<u32>,
    },
    ApplyModel {
        #[arg(long)]
        st_line_id: i64,
        #[arg(long)]
        model_id: i64,
    },
    /// Send a raw command such as `add_new_amls,42` to one line.
    Todo {
        #[arg(long)]
        st_line_id: i64,
        command: String,
    },
}

/// Prints every navigation request instead of following it.
struct PrintingActionDispatcher;

#[async_trait]
impl ActionDispatcher for PrintingActionDispatcher {
    async fn do_action(&self, action: ActionRequest) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(&action)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(journal_id) = cli.journal_id {
        settings.journal_id = Some(journal_id);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rpc = OdooRpcService::new(&settings.server_url)?;
    let uid = rpc
        .authenticate(&settings.database, &settings.login, &settings.password)
        .await
        .with_context(|| format!("failed to log in to {}", settings.server_url))?;
    info!(uid, database = %settings.database, "authenticated");

    let ctx = BankRecContext::new(Arc::new(rpc), Arc::new(PrintingActionDispatcher));
    let journal_id = settings.journal_id.map(JournalId);
    let query = StLineQuery {
        journal_id,
        limit: settings.page_limit,
        ..StLineQuery::default()
    };

    match cli.command {
        Command::Lines => print_lines(ctx.service(), &query).await?,
        Command::Info => {
            let info = ctx.service().collect_global_info(journal_id).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::AutoValidate { max } => {
            let options = KanbanOptions {
                query,
                default_journal_id: journal_id,
                ..KanbanOptions::default()
            };
            let session = BankRecSession::start(ctx, options).await?;
            auto_validate(&session, max).await?;
        }
        Command::ApplyModel {
            st_line_id,
            model_id,
        } => {
            let session = open_line(ctx, StLineId(st_line_id), query).await?;
            let form = session.form().context("statement line editor did not open")?;
            form.apply_reconciliation_model(RecoModelId(model_id))
                .await?;
            print_record(&form.record())?;
        }
        Command::Todo {
            st_line_id,
            command,
        } => {
            let command: TodoCommand = command.parse()?;
            let session = open_line(ctx, StLineId(st_line_id), query).await?;
            let form = session.form().context("statement line editor did not open")?;
            form.execute(command).await?;
            print_record(&form.record())?;
        }
    }

    Ok(())
}

async fn print_lines(service: &dyn ReconciliationService, query: &StLineQuery) -> Result<()> {
    let lines = service.load_statement_lines(query).await?;
    if lines.is_empty() {
        println!("no statement lines");
        return Ok(());
    }
    for line in lines {
        let marker = if line.is_eligible() { '*' } else { ' ' };
        println!(
            "{marker} {:>6} {} {:>14.2} {:<12} {}",
            line.id,
            line.date,
            line.amount,
            format!("{:?}", line.status()),
            line.payment_ref
        );
    }
    Ok(())
}

/// Opens the list restricted to one line so that its editor mounts.
async fn open_line(
    ctx: Arc<BankRecContext>,
    st_line_id: StLineId,
    query: StLineQuery,
) -> Result<BankRecSession> {
    let options = KanbanOptions {
        query: StLineQuery {
            st_line_ids: vec![st_line_id],
            ..query
        },
        requested_st_line_id: Some(st_line_id),
        ..KanbanOptions::default()
    };
    let session = BankRecSession::start(ctx, options).await?;
    if session.kanban().selected_st_line_id() != Some(st_line_id) {
        anyhow::bail!("statement line {st_line_id} is not in the selected journal");
    }
    Ok(session)
}

async fn auto_validate(session: &BankRecSession, max: Option<u32>) -> Result<()> {
    let mut seen = HashSet::new();
    let mut validated = 0;

    while max.map_or(true, |max| validated < max) {
        let Some(form) = session.form() else { break };
        let st_line_id = form.st_line_id();
        if !seen.insert(st_line_id) {
            break;
        }
        let eligible = session
            .kanban()
            .records()
            .iter()
            .any(|line| line.id == st_line_id && line.is_eligible());
        if !eligible {
            break;
        }

        if form.record().state != RecordState::Valid {
            warn!(st_line_id = %st_line_id, "proposal does not balance, skipping");
            session.kanban().move_to_next().await?;
            continue;
        }
        form.click_button(FormButton::Validate).await?;
        validated += 1;
        info!(st_line_id = %st_line_id, validated, "statement line validated");
    }

    match session.counter_summary() {
        Some(summary) => println!(
            "Reconciled {} lines in {} ({}s per transaction)",
            summary.reconciled_count, summary.human_duration, summary.seconds_per_transaction
        ),
        None => println!("Nothing was reconciled"),
    }
    Ok(())
}

fn print_record(record: &DetailRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}
