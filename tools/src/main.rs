//! console-runner: headless driver for the AML monitoring console.
//!
//! Usage:
//!   console-runner --db profiles.db --data-dir ./data
//!   console-runner --db profiles.db --ipc-mode --simulate-nodes --seed 7

use amlwatch_core::{
    cases::{CaseFilter, StatusCounts, Str},
    command::ConsoleCommand,
    config::ConsoleConfig,
    console::{Console, ConsoleSummary},
    error::ConsoleResult,
    pagination::{ApplyOutcome, Pager},
    profile::TransactionRiskProfile,
    query::{QueryCriteria, RawCriteria},
    risk_band::RiskBand,
    rollout::{HttpNodeClient, NodeClient, SimulatedNodeClient},
    rules::{AnalysisCategory, AnalysisRule},
    source::{HttpProfileSource, ProfileSource},
    store::ProfileStore,
    types::ProfileKind,
};
use anyhow::Result;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Query {
        kind: ProfileKind,
        #[serde(default)]
        criteria: RawCriteria,
    },
    Count {
        kind: ProfileKind,
        #[serde(default)]
        criteria: RawCriteria,
    },
    ListStrs {
        #[serde(default)]
        filter: CaseFilter,
    },
    ListRules {
        #[serde(default)]
        category: Option<AnalysisCategory>,
    },
    DumpNodeConfig {
        node_id: String,
    },
    Command {
        command: ConsoleCommand,
    },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState<'a> {
    summary:      ConsoleSummary,
    pending_strs: Vec<&'a Str>,
    rules:        Vec<&'a AnalysisRule>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let simulate_nodes = args.iter().any(|a| a == "--simulate-nodes");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !ipc_mode {
        println!("AML Watch console-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  nodes:     {}", if simulate_nodes { "simulated" } else { "http" });
        println!("  seed:      {seed}");
        println!();
    }

    let store = if db == ":memory:" {
        ProfileStore::in_memory()?
    } else {
        ProfileStore::open(db)?
    };
    store.migrate()?;

    let config = ConsoleConfig::load(data_dir)?;
    log::info!("console-runner starting (ipc_mode={ipc_mode}, simulate_nodes={simulate_nodes})");

    if simulate_nodes {
        let console = Console::new(store, config, SimulatedNodeClient::new(seed))?;
        drive(console, ipc_mode).await
    } else {
        let client = HttpNodeClient::with_timeout(config.settings.node_request_timeout())?;
        let console = Console::new(store, config, client)?;
        drive(console, ipc_mode).await
    }
}

async fn drive<C: NodeClient>(mut console: Console<C>, ipc_mode: bool) -> Result<()> {
    if ipc_mode {
        run_ipc_loop(&mut console).await
    } else {
        print_summary(&console)?;
        print_high_risk_page(&console).await
    }
}

async fn run_ipc_loop<C: NodeClient>(console: &mut Console<C>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            other => handle_command(console, other).await,
        };
        let line = match response {
            Ok(value) => value,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
    }
    Ok(())
}

async fn handle_command<C: NodeClient>(
    console: &mut Console<C>,
    cmd: IpcCommand,
) -> ConsoleResult<serde_json::Value> {
    let value = match cmd {
        IpcCommand::GetState => {
            let state = build_ui_state(console)?;
            serde_json::to_value(state)?
        }
        IpcCommand::Query { kind, criteria } => {
            let criteria = QueryCriteria::from(criteria);
            match kind {
                ProfileKind::Transaction => serde_json::to_value(console.transactions(&criteria)?)?,
                ProfileKind::Customer    => serde_json::to_value(console.customers(&criteria)?)?,
            }
        }
        IpcCommand::Count { kind, criteria } => {
            let criteria = QueryCriteria::from(criteria);
            serde_json::json!({ "count": console.store().count_profiles(kind, &criteria)? })
        }
        IpcCommand::ListStrs { filter } => serde_json::to_value(console.list_strs(&filter))?,
        IpcCommand::ListRules { category } => serde_json::to_value(console.list_rules(category))?,
        IpcCommand::DumpNodeConfig { node_id } => console.dump_node_config(&node_id).await?,
        IpcCommand::Command { command } => console.execute(command).await?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn build_ui_state<C: NodeClient>(console: &Console<C>) -> ConsoleResult<UiState<'_>> {
    let pending = CaseFilter {
        status: Some(amlwatch_core::cases::StrStatus::Pending),
        search: String::new(),
    };
    Ok(UiState {
        summary:      console.summary()?,
        pending_strs: console.list_strs(&pending),
        rules:        console.list_rules(None),
    })
}

fn print_summary<C: NodeClient>(console: &Console<C>) -> Result<()> {
    let summary = console.summary()?;
    let StatusCounts { pending, filed, dismissed } = summary.cases;

    println!("=== CONSOLE SUMMARY ===");
    println!("  transaction profiles: {}", summary.transaction_count);
    println!("  customer profiles:    {}", summary.customer_count);
    println!("  rules enabled:        {}/{}", summary.rules_enabled, summary.rules_total);
    println!("  STRs:                 {pending} pending, {filed} filed, {dismissed} dismissed");
    println!(
        "  fleet:                {}/{} online, {:.0} TPS, {:.0} ms avg latency",
        summary.fleet.online_nodes,
        summary.fleet.total_nodes,
        summary.fleet.total_throughput,
        summary.fleet.average_latency
    );
    println!("  database connection:  {:?}", summary.database_status);
    println!("  kafka connection:     {:?}", summary.kafka_status);

    Ok(())
}

/// First page of HIGH transactions, read through the pager the way the
/// console table reads it.
async fn print_high_risk_page<C: NodeClient>(console: &Console<C>) -> Result<()> {
    let settings = console.settings();
    match &settings.profile_source_url {
        Some(url) => {
            let source = HttpProfileSource::<TransactionRiskProfile>::with_timeout(url, settings.node_request_timeout())?;
            show_band_page(Pager::new(source, settings.items_per_page, settings.search_debounce())).await
        }
        None => {
            show_band_page(Pager::new(console.store(), settings.items_per_page, settings.search_debounce())).await
        }
    }
}

async fn show_band_page<S>(pager: Pager<TransactionRiskProfile, S>) -> Result<()>
where
    S: ProfileSource<TransactionRiskProfile>,
{
    if let Some(ApplyOutcome::Failed(e)) = pager.select_band(Some(RiskBand::High)).await {
        return Err(e.into());
    }
    let view = pager.view();

    println!();
    println!(
        "=== HIGH RISK TRANSACTIONS (page {} of {}, {} total) ===",
        view.current_page,
        view.total_pages.unwrap_or(0).max(1),
        view.total_count.unwrap_or(0)
    );
    if view.rows.is_empty() {
        println!("  (none)");
    } else {
        for tx in &view.rows {
            println!(
                "  {} | {} | {:.2} | score {:.1}",
                tx.transaction_id,
                tx.from_name,
                tx.amount,
                tx.overall_risk_score.unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
