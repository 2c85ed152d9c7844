//! Console: command dispatch, event logging, config loading.

use amlwatch_core::{
    cases::{CaseFilter, StrStatus},
    command::ConsoleCommand,
    config::ConsoleConfig,
    console::Console,
    error::ConsoleError,
    narrative::{NarrativeRequest, NarrativeService},
    nodes::NodeStatus,
    rollout::{ConnectionStatus, DataSourceType, RolloutAction, SimulatedNodeClient},
    store::{NewCustomerProfile, NewTransactionProfile, ProfileStore},
};
use async_trait::async_trait;

fn console() -> Console<SimulatedNodeClient> {
    let store = ProfileStore::in_memory().unwrap();
    store.migrate().unwrap();
    let client = SimulatedNodeClient::new(42).with_failure_rate(0.0);
    Console::new(store, ConsoleConfig::default_test(), client).unwrap()
}

fn seed_profile(console: &Console<SimulatedNodeClient>, id: &str, score: f64) {
    console
        .store()
        .insert_transaction_profile(&NewTransactionProfile {
            transaction_id:     id.into(),
            from_account:       format!("ACC-{id}"),
            from_name:          "Holder".into(),
            amount:             25_000.0,
            transaction_type:   "TRANSFER".into(),
            overall_risk_score: Some(score),
            reason_codes:       Some("['HIGH_VELOCITY']".into()),
            generated_at:       "2024-06-01T00:00:00Z".into(),
            ..NewTransactionProfile::default()
        })
        .unwrap();
}

fn command(json: serde_json::Value) -> ConsoleCommand {
    serde_json::from_value(json).unwrap()
}

/// The shipped data directory loads and matches the test defaults.
#[test]
fn shipped_config_loads() {
    let config = ConsoleConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/../data")).unwrap();
    let defaults = ConsoleConfig::default_test();
    assert_eq!(config.settings, defaults.settings);
    assert_eq!(config.rules, defaults.rules);
    assert_eq!(config.nodes.len(), 3);
    assert_eq!(config.nodes[2].status, NodeStatus::Degraded);
    assert_eq!(config.connections, defaults.connections);

    let err = ConsoleConfig::load("/nonexistent/amlwatch").unwrap_err();
    assert!(err.to_string().contains("Cannot read"));
}

/// Manual STRs go through the command path and land in the event log once.
#[tokio::test]
async fn generate_and_file_str_via_commands() {
    let mut console = console();
    seed_profile(&console, "TX-1", 60.0);

    let case = console
        .execute(command(serde_json::json!({ "cmd": "generate_str", "transaction_id": "TX-1" })))
        .await
        .unwrap();
    assert_eq!(case["status"], "PENDING");
    assert_eq!(case["customer_id"], "ACC-TX-1");
    let case_id = case["id"].as_str().unwrap().to_string();

    let err = console
        .execute(command(serde_json::json!({ "cmd": "generate_str", "transaction_id": "TX-1" })))
        .await
        .unwrap_err();
    assert!(err.is_duplicate_case());
    assert_eq!(console.store().events_of_type("case_generated").unwrap().len(), 1);

    let filed = console
        .execute(command(serde_json::json!({ "cmd": "file_str", "case_id": &case_id })))
        .await
        .unwrap();
    assert_eq!(filed["status"], "FILED");
    assert!(console.dismiss_str(&case_id).is_err());
    assert_eq!(console.store().events_of_type("case_status_changed").unwrap().len(), 1);
}

/// Without a stored profile the analyst must name the customer.
#[test]
fn unknown_transaction_needs_customer() {
    let mut console = console();
    assert!(matches!(
        console.generate_str("TX-404", None, None, &[]),
        Err(ConsoleError::ProfileNotFound { .. })
    ));
    let case = console
        .generate_str("TX-404", Some("CUST-7"), Some("Tip-off"), &["CASH_INTENSIVE".to_string()])
        .unwrap();
    assert_eq!(case.customer_id, "CUST-7");
    assert_eq!(case.reason, "Tip-off | Flags: CASH_INTENSIVE");
}

/// With a stored profile the analyst's flags and customer still reach the case.
#[tokio::test]
async fn stored_profile_keeps_analyst_input() {
    let mut console = console();
    seed_profile(&console, "TX-1", 60.0);

    let case = console
        .execute(command(serde_json::json!({
            "cmd": "generate_str",
            "transaction_id": "TX-1",
            "customer_id": "CUST-9",
            "reason": "Analyst note",
            "flags": ["STRUCTURING", "HIGH_VELOCITY"]
        })))
        .await
        .unwrap();
    assert_eq!(case["reason"], "Analyst note | Flags: HIGH_VELOCITY, STRUCTURING");
    assert_eq!(case["customer_id"], "CUST-9");

    let events = console.store().events_of_type("case_generated").unwrap();
    assert!(events[0].payload.contains("\"customer_id\":\"CUST-9\""));
}

/// A case whose event cannot be logged is not kept, so a retry succeeds.
#[test]
fn case_is_kept_only_after_logging() {
    let source = ProfileStore::in_memory().unwrap();
    source.migrate().unwrap();
    source
        .insert_transaction_profile(&NewTransactionProfile {
            transaction_id:     "TX-C".into(),
            from_account:       "ACC-C".into(),
            overall_risk_score: Some(95.0),
            generated_at:       "2024-06-01T00:00:00Z".into(),
            ..NewTransactionProfile::default()
        })
        .unwrap();
    let profile = source.transaction_profile("TX-C").unwrap().unwrap();

    let unmigrated = ProfileStore::in_memory().unwrap();
    let client = SimulatedNodeClient::new(42).with_failure_rate(0.0);
    let mut console = Console::new(unmigrated, ConsoleConfig::default_test(), client).unwrap();

    assert!(console.auto_trigger(&profile).is_err());
    assert!(console.cases().all().is_empty());

    console.store().migrate().unwrap();
    let case = console.auto_trigger(&profile).unwrap().expect("critical triggers");
    assert_eq!(console.cases().all().len(), 1);
    assert!(console.store().events_of_type("case_generated").unwrap()[0].payload.contains(&case.id));
}

/// Connection edits, field mappings and health updates are logged without secrets.
#[tokio::test]
async fn configuration_changes_are_logged() {
    let mut console = console();
    console
        .execute(command(serde_json::json!({
            "cmd": "update_connection", "source": "DATABASE", "field": "password", "value": "s3cret"
        })))
        .await
        .unwrap();
    console
        .execute(command(serde_json::json!({
            "cmd": "map_field", "source": "KAFKA", "source_field": "TXN_REF",
            "engine_field": "transaction_id", "data_type": "string"
        })))
        .await
        .unwrap();
    console.update_node_health("node-01", NodeStatus::Degraded, Default::default()).unwrap();

    let updated = console.store().events_of_type("connection_updated").unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].source, "connections");
    assert!(!updated[0].payload.contains("s3cret"));

    let mapped = console.store().events_of_type("field_mapped").unwrap();
    assert_eq!(mapped.len(), 1);
    assert!(mapped[0].payload.contains("TXN_REF"));

    let health = console.store().events_of_type("node_health_updated").unwrap();
    assert_eq!(health.len(), 1);
    assert!(health[0].payload.contains("\"status\":\"degraded\""));
    assert_eq!(console.store().event_count().unwrap(), 3);

    assert!(console.update_node_health("node-99", NodeStatus::Online, Default::default()).is_err());
    assert_eq!(console.store().event_count().unwrap(), 3);
}

/// A sweep raises one STR per CRITICAL profile and is idempotent.
#[test]
fn auto_trigger_sweep() {
    let mut console = console();
    seed_profile(&console, "TX-C1", 92.0);
    seed_profile(&console, "TX-C2", 85.0);
    seed_profile(&console, "TX-H", 75.0);
    seed_profile(&console, "TX-L", 12.0);

    let raised = console.sweep_auto_triggers().unwrap();
    assert_eq!(raised.len(), 2);
    assert!(raised.iter().all(|c| c.reason.starts_with("Automated Trigger")));
    assert!(console.sweep_auto_triggers().unwrap().is_empty());

    let events = console.store().events_of_type("case_generated").unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.payload.contains("\"automatic\":true")));

    let pending = console.list_strs(&CaseFilter { status: Some(StrStatus::Pending), search: String::new() });
    assert_eq!(pending.len(), 2);
}

struct EchoNarrative;

#[async_trait(?Send)]
impl NarrativeService for EchoNarrative {
    async fn narrate(&self, request: &NarrativeRequest<'_>) -> anyhow::Result<String> {
        let occupation = request
            .customer
            .and_then(|c| c.occupation.clone())
            .unwrap_or_else(|| "none".into());
        Ok(format!("occupation={occupation}"))
    }
}

/// Narratives see the stored customer profile; the default narrator falls back.
#[tokio::test]
async fn narrate_str_uses_store_context() {
    let mut console = console();
    seed_profile(&console, "TX-1", 60.0);
    console
        .store()
        .insert_customer_profile(&NewCustomerProfile {
            account_no: "ACC-TX-1".into(),
            full_name:  "Holder".into(),
            occupation: Some("Importer".into()),
            risk_score: Some(66.0),
            created_at: "2024-05-01T00:00:00Z".into(),
            ..NewCustomerProfile::default()
        })
        .unwrap();
    let case = console.generate_str("TX-1", None, None, &[]).unwrap();

    let fallback = console.narrate_str(&case.id).await.unwrap();
    assert_eq!(fallback, "AI Analysis Unavailable");

    let mut console = console.with_narrator(Box::new(EchoNarrative));
    let reply = console
        .execute(command(serde_json::json!({ "cmd": "narrate_str", "case_id": case.id })))
        .await
        .unwrap();
    assert_eq!(reply["narrative"], "occupation=Importer");
}

/// Rule edits are logged; rejected edits are not.
#[tokio::test]
async fn rule_commands() {
    let mut console = console();
    let reply = console
        .execute(command(serde_json::json!({ "cmd": "toggle_rule", "rule_id": "t2" })))
        .await
        .unwrap();
    assert_eq!(reply["enabled"], true);

    let rule = console
        .execute(command(serde_json::json!({
            "cmd": "set_rule_param", "rule_id": "t1", "key": "zScoreThreshold", "value": 4.5
        })))
        .await
        .unwrap();
    assert_eq!(rule["parameters"]["zScoreThreshold"], 4.5);

    let err = console
        .execute(command(serde_json::json!({
            "cmd": "set_rule_param", "rule_id": "t1", "key": "zScoreThreshold", "value": "high"
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ParameterTypeMismatch { .. }));

    assert_eq!(console.store().event_count().unwrap(), 2);
    assert_eq!(console.summary().unwrap().rules_enabled, 5);
}

/// Rollout to the default selection connects the database source only.
#[tokio::test(start_paused = true)]
async fn rollout_updates_connection_status() {
    let mut console = console();
    let node = console.register_node("Engine Four", "Hawassa", "http://engine.four:8080").unwrap();
    console.update_node_health(&node.id, NodeStatus::Offline, Default::default()).unwrap();

    let report = console
        .execute(command(serde_json::json!({
            "cmd": "rollout", "source": "DATABASE", "action": "test_and_deploy"
        })))
        .await
        .unwrap();
    assert_eq!(report["outcomes"].as_object().unwrap().len(), 3, "offline node not selected");
    assert_eq!(console.connection(DataSourceType::Database).status, ConnectionStatus::Connected);
    assert_eq!(console.connection(DataSourceType::Kafka).status, ConnectionStatus::Disconnected);
    assert_eq!(console.store().events_of_type("rollout_completed").unwrap().len(), 1);

    let dumped = console.dump_node_config("node-01").await.unwrap();
    assert_eq!(dumped["Data_Analysis_Configurations"]["Transaction_Related_Analysis"]["BrentFord_Digit_Analysis"], "false");

    let empty = console
        .rollout(DataSourceType::Kafka, RolloutAction::TestAndDeploy, Some(Vec::new()), None)
        .await
        .unwrap();
    assert!(empty.is_empty());
    assert_eq!(console.connection(DataSourceType::Kafka).status, ConnectionStatus::Disconnected);
    assert_eq!(console.store().events_of_type("rollout_completed").unwrap().len(), 1);

    console
        .execute(command(serde_json::json!({
            "cmd": "update_connection", "source": "DATABASE", "field": "host", "value": "db-02.internal"
        })))
        .await
        .unwrap();
    assert_eq!(console.connection(DataSourceType::Database).status, ConnectionStatus::Disconnected);

    console
        .execute(command(serde_json::json!({ "cmd": "remove_node", "node_id": node.id })))
        .await
        .unwrap();
    assert_eq!(console.nodes().list().len(), 3);
    assert_eq!(console.store().events_of_type("node_registered").unwrap().len(), 1);
    assert_eq!(console.store().events_of_type("node_removed").unwrap().len(), 1);
}

/// Summary counts come from the store and the in-memory registries.
#[test]
fn summary_counts() {
    let console = console();
    seed_profile(&console, "TX-1", 10.0);
    seed_profile(&console, "TX-2", 90.0);
    let summary = console.summary().unwrap();
    assert_eq!(summary.transaction_count, 2);
    assert_eq!(summary.customer_count, 0);
    assert_eq!(summary.rules_total, 5);
    assert_eq!(summary.fleet.total_nodes, 3);
    assert_eq!(summary.fleet.online_nodes, 2);
    assert_eq!(summary.database_status, ConnectionStatus::Disconnected);
}
