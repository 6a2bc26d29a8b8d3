//! concordia: command-line client for persisted corpus queries.
//!
//! Reopens query chains, manages the query history and evaluates
//! paradigmatic queries against a remote concordia server.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use concordia_chain::{CodecConfig, Session};
use concordia_client::ConcordiaClient;
use concordia_core::{
    defaults, HistoryFilter, OperationKind, PQuerySpec, PersistedId, QueryOperation,
    SubQueryItem, Supertype,
};
use concordia_pquery::{ParadigmaticCombiner, SortColumn, SortState};
use concordia_tasks::{TaskWatcher, WatcherConfig};

#[derive(Parser)]
#[command(name = "concordia")]
#[command(author, version, about = "Persisted corpus query client")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reopen a persisted query chain and print its operations
    Open {
        /// Persisted id, with or without the leading `~`
        id: String,
    },

    /// List the query history
    History {
        /// Restrict to one category (concordance, pquery, wlist)
        #[arg(short, long)]
        supertype: Option<Supertype>,

        /// List archived entries instead of active ones
        #[arg(short, long)]
        archived: bool,

        /// Case-insensitive text to look for in labels and descriptions
        #[arg(short = 'q', long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = defaults::HISTORY_PAGE_SIZE)]
        page_size: usize,
    },

    /// Archive a history entry
    Archive { entry: String },

    /// Move an archived history entry back to the active list
    Unarchive { entry: String },

    /// Delete a history entry
    Delete { entry: String },

    /// Set a history entry label; omit the label to clear it
    Rename { entry: String, label: Option<String> },

    /// Evaluate a paradigmatic query
    Pquery {
        #[arg(short, long)]
        corpus: String,

        /// Attribute whose values are combined
        #[arg(short, long, default_value = defaults::PQUERY_ATTR)]
        attr: String,

        /// Required sub-query as CQL[:MINFREQ] (repeatable)
        #[arg(short = 's', long = "sub", required = true, num_args = 1..)]
        subqueries: Vec<String>,

        /// Excluded sub-query CQL (repeatable)
        #[arg(short = 'n', long = "neg")]
        negated: Vec<String>,

        /// Sort column: value, freq or a sub-query number
        #[arg(long)]
        sort: Option<SortColumn>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = defaults::PQUERY_PAGE_SIZE)]
        page_size: usize,

        /// Print every row as CSV instead of a page
        #[arg(long)]
        csv: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("concordia=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = Arc::new(ConcordiaClient::from_env()?);
    let session = Session::new(client.clone(), client.clone(), CodecConfig::from_env());

    match cli.command {
        Commands::Open { id } => cmd_open(&session, &id).await,
        Commands::History {
            supertype,
            archived,
            search,
            page,
            page_size,
        } => {
            let mut filter = HistoryFilter::default()
                .with_archived_only(archived)
                .with_page(page, page_size);
            if let Some(supertype) = supertype {
                filter = filter.with_supertype(supertype);
            }
            if let Some(search) = search {
                filter = filter.with_query_contains(search);
            }
            cmd_history(&session, &filter).await
        }
        Commands::Archive { entry } => {
            session.history().await.archive(&entry).await?;
            println!("Archived {}", entry);
            Ok(())
        }
        Commands::Unarchive { entry } => {
            session.history().await.unarchive(&entry).await?;
            println!("Unarchived {}", entry);
            Ok(())
        }
        Commands::Delete { entry } => {
            session.history().await.soft_delete(&entry).await?;
            println!("Deleted {}", entry);
            Ok(())
        }
        Commands::Rename { entry, label } => {
            session
                .history()
                .await
                .rename(&entry, label.as_deref().unwrap_or(""))
                .await?;
            println!("Renamed {}", entry);
            Ok(())
        }
        Commands::Pquery {
            corpus,
            attr,
            subqueries,
            negated,
            sort,
            page,
            page_size,
            csv,
        } => {
            let spec = build_spec(&corpus, &attr, &subqueries, &negated)?;
            let watcher = TaskWatcher::new(client.clone(), WatcherConfig::from_env());
            let combiner = ParadigmaticCombiner::new(client, watcher);
            cmd_pquery(&session, &combiner, &spec, sort, page, page_size, csv).await
        }
    }
}

async fn cmd_open(session: &Session, raw: &str) -> anyhow::Result<()> {
    let id = parse_persisted_id(raw)?;
    let opened = session
        .open(&id)
        .await
        .with_context(|| format!("cannot open {}", id.to_url_param()))?;

    if let Some(ref cause) = opened.recovered_from {
        eprintln!("Warning: chain restored from its root only ({})", cause);
    }
    for (i, op) in opened.chain.iter().enumerate() {
        let id = op
            .persisted_id()
            .map(|id| id.to_url_param())
            .unwrap_or_default();
        println!("{:>2}. {:<10} {}  {}", i, op.kind, id, op.describe());
    }
    Ok(())
}

async fn cmd_history(session: &Session, filter: &HistoryFilter) -> anyhow::Result<()> {
    let page = session.history().await.list(filter).await?;
    if page.entries.is_empty() {
        println!("No history entries.");
        return Ok(());
    }
    for entry in &page.entries {
        println!(
            "{}  {}  {:<18} ~{}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.supertype().label(),
            entry.query_id,
            entry.display_label()
        );
    }
    println!(
        "Page {} ({} entries{})",
        page.page,
        page.total,
        if page.has_more { ", more available" } else { "" }
    );
    Ok(())
}

async fn cmd_pquery(
    session: &Session,
    combiner: &ParadigmaticCombiner,
    spec: &PQuerySpec,
    sort: Option<SortColumn>,
    page: usize,
    page_size: usize,
    csv: bool,
) -> anyhow::Result<()> {
    let mut result = combiner.evaluate(spec).await?;
    if let Some(column) = sort {
        result = result.sorted(SortState::new(column, column.initial_direction()))?;
    }

    let chain = session
        .submit(QueryOperation::new(
            OperationKind::Paradigmatic,
            spec.to_form_args(),
        ))
        .await?;
    session.attach_result_size(result.len() as u64).await?;

    if csv {
        print!("{}", result.to_csv());
        return Ok(());
    }

    let view = result.page(page, page_size)?;
    let header: Vec<String> = (1..=spec.subqueries.len()).map(|i| format!("#{}", i)).collect();
    println!("{:<24} {:>8} {}", "value", "total", header.join(" "));
    for row in &view.rows {
        let freqs: Vec<String> = row.per_subquery_freq.iter().map(|f| f.to_string()).collect();
        println!("{:<24} {:>8} {}", row.value, row.total_freq, freqs.join(" "));
    }
    println!("Page {} ({} rows)", view.indicator(), view.total_rows);
    if let Some(id) = chain.current_tail().ok().and_then(|op| op.persisted_id()) {
        println!("Saved as {}", id.to_url_param());
    }
    Ok(())
}

/// Accept both `~id` and a bare id.
fn parse_persisted_id(raw: &str) -> anyhow::Result<PersistedId> {
    let raw = raw.trim();
    let id = if raw.starts_with(PersistedId::URL_PREFIX) {
        PersistedId::from_url_param(raw)?
    } else {
        PersistedId::new(raw)?
    };
    Ok(id)
}

/// Parse `CQL[:MINFREQ]`. Only a numeric suffix counts as a threshold, so
/// CQL containing `:` is left intact.
fn parse_subquery(raw: &str) -> anyhow::Result<SubQueryItem> {
    if let Some((cql, min_freq)) = raw.rsplit_once(':') {
        if let Ok(min_freq) = min_freq.trim().parse::<u64>() {
            if cql.trim().is_empty() {
                bail!("empty sub-query in '{}'", raw);
            }
            return Ok(SubQueryItem::required(cql.trim(), min_freq));
        }
    }
    if raw.trim().is_empty() {
        bail!("empty sub-query");
    }
    Ok(SubQueryItem::required(raw.trim(), defaults::PQUERY_MIN_FREQ))
}

fn build_spec(
    corpus: &str,
    attr: &str,
    subqueries: &[String],
    negated: &[String],
) -> anyhow::Result<PQuerySpec> {
    let mut spec = PQuerySpec::new(corpus, attr);
    for raw in subqueries {
        spec = spec.with_subquery(parse_subquery(raw)?);
    }
    for cql in negated {
        spec = spec.with_subquery(SubQueryItem::excluded(cql.trim()));
    }
    spec.validate()?;
    Ok(spec)
}
