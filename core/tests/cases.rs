//! STR lifecycle: dedup, transitions, auto-trigger policy, narratives.

use amlwatch_core::{
    cases::{compose_reason, CaseFilter, CaseManager, ManualTrigger, StrStatus, MANUAL_TRIGGER_REASON},
    error::ConsoleError,
    narrative::{NarrativeRequest, NarrativeService, UnconfiguredNarrative, NARRATIVE_FALLBACK},
    profile::TransactionRiskProfile,
    store::{NewTransactionProfile, ProfileStore},
};
use async_trait::async_trait;

fn profile(id: &str, score: f64, reason_codes: Option<&str>) -> TransactionRiskProfile {
    let store = ProfileStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
        .insert_transaction_profile(&NewTransactionProfile {
            transaction_id:     id.into(),
            from_account:       format!("ACC-{id}"),
            from_name:          "Holder".into(),
            to_account:         "ACC-0001".into(),
            to_name:            "Shell Co".into(),
            amount:             50_000.0,
            transaction_type:   "TRANSFER".into(),
            overall_risk_score: Some(score),
            reason_codes:       reason_codes.map(str::to_string),
            generated_at:       "2024-06-01T00:00:00Z".into(),
        })
        .unwrap();
    store.transaction_profile(id).unwrap().unwrap()
}

fn flags(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A second STR for the same transaction is rejected and the list is unchanged.
#[test]
fn one_case_per_transaction() {
    let mut cases = CaseManager::new(false);
    let first = cases.generate("TX-1", "CUST-1", "Structuring", &[]).unwrap();
    assert_eq!(first.status, StrStatus::Pending);
    assert!(first.id.starts_with("STR-"));
    assert_eq!(first.id.len(), 16);

    let err = cases.generate("TX-1", "CUST-1", "Again", &[]).unwrap_err();
    match err {
        ConsoleError::DuplicateCase { existing_case_id, .. } => assert_eq!(existing_case_id, first.id),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(cases.all().len(), 1);
}

/// Newest cases come first.
#[test]
fn list_is_most_recent_first() {
    let mut cases = CaseManager::new(false);
    cases.generate("TX-1", "C1", "r", &[]).unwrap();
    cases.generate("TX-2", "C2", "r", &[]).unwrap();
    let ids: Vec<&str> = cases.all().iter().map(|c| c.transaction_id.as_str()).collect();
    assert_eq!(ids, vec!["TX-2", "TX-1"]);
}

/// FILED and DISMISSED never move again.
#[test]
fn terminal_states_are_final() {
    let mut cases = CaseManager::new(false);
    let a = cases.generate("TX-1", "C1", "r", &[]).unwrap();
    let b = cases.generate("TX-2", "C2", "r", &[]).unwrap();

    assert_eq!(cases.file(&a.id).unwrap(), StrStatus::Pending);
    assert_eq!(cases.dismiss(&b.id).unwrap(), StrStatus::Pending);

    assert!(matches!(
        cases.dismiss(&a.id),
        Err(ConsoleError::InvalidTransition { from: StrStatus::Filed, to: StrStatus::Dismissed, .. })
    ));
    assert!(matches!(cases.file(&b.id), Err(ConsoleError::InvalidTransition { .. })));
    assert!(matches!(cases.file(&a.id), Err(ConsoleError::InvalidTransition { .. })));
    assert_eq!(cases.get(&a.id).unwrap().status, StrStatus::Filed);
    assert_eq!(cases.get(&b.id).unwrap().status, StrStatus::Dismissed);
    assert!(matches!(cases.file("STR-MISSING"), Err(ConsoleError::CaseNotFound { .. })));
}

/// Flags already named in the reason are not repeated.
#[test]
fn reason_composition() {
    assert_eq!(compose_reason("Structuring", &[]), "Structuring");
    assert_eq!(
        compose_reason("Structuring near ROUND_NUMBER", &flags(&["ROUND_NUMBER", "GEO_RISK"])),
        "Structuring near ROUND_NUMBER | Flags: GEO_RISK"
    );
    assert_eq!(
        compose_reason("  ", &flags(&["ROUND_NUMBER", " ", "GEO_RISK"])),
        "Automated Trigger: ROUND_NUMBER, GEO_RISK"
    );
    assert_eq!(
        compose_reason("Layering", &flags(&["GEO_RISK", " GEO_RISK", "GEO_RISK "])),
        "Layering | Flags: GEO_RISK"
    );
}

/// Manual cases use the analyst's reason or the stock one, plus engine flags.
#[test]
fn manual_case_from_profile() {
    let mut cases = CaseManager::new(false);
    let p = profile("TX-9", 40.0, Some("['HIGH_VELOCITY']"));
    let case = cases.generate_for_profile(&p, &ManualTrigger::default()).unwrap();
    assert_eq!(case.customer_id, "ACC-TX-9");
    assert_eq!(case.reason, format!("{MANUAL_TRIGGER_REASON} | Flags: HIGH_VELOCITY"));

    let q = profile("TX-10", 40.0, None);
    let manual = ManualTrigger { reason: Some("Tip-off from branch"), ..ManualTrigger::default() };
    let case = cases.generate_for_profile(&q, &manual).unwrap();
    assert_eq!(case.reason, "Tip-off from branch");
}

/// Analyst flags join the engine's codes once each; the analyst's customer wins.
#[test]
fn manual_flags_merge_with_reason_codes() {
    let mut cases = CaseManager::new(false);
    let p = profile("TX-11", 40.0, Some("['GEO_RISK', 'ROUND_NUMBER']"));
    let analyst_flags = flags(&["STRUCTURING", "GEO_RISK", "STRUCTURING"]);
    let manual = ManualTrigger {
        customer_id: Some("CUST-9"),
        reason:      Some("Analyst note"),
        flags:       &analyst_flags,
    };
    let case = cases.generate_for_profile(&p, &manual).unwrap();
    assert_eq!(case.reason, "Analyst note | Flags: GEO_RISK, ROUND_NUMBER, STRUCTURING");
    assert_eq!(case.customer_id, "CUST-9");

    let q = profile("TX-12", 40.0, None);
    let blank = ManualTrigger { customer_id: Some("  "), ..ManualTrigger::default() };
    assert_eq!(cases.generate_for_profile(&q, &blank).unwrap().customer_id, "ACC-TX-12");
}

/// Preparing a case stores nothing until it is committed.
#[test]
fn prepare_then_commit() {
    let mut cases = CaseManager::new(false);
    let case = cases.prepare("TX-1", "C1", "r", &[]).unwrap();
    assert!(cases.all().is_empty());
    assert!(cases.prepare("TX-1", "C1", "r", &[]).is_ok(), "no case held yet");

    cases.commit(case.clone());
    assert_eq!(cases.get(&case.id).unwrap().status, StrStatus::Pending);
    assert!(cases.prepare("TX-1", "C1", "r", &[]).unwrap_err().is_duplicate_case());
}

/// CRITICAL always triggers, HIGH only under the policy, lower bands never.
#[test]
fn auto_trigger_policy() {
    let critical = profile("TX-C", 91.0, Some("['GEO_RISK']"));
    let high = profile("TX-H", 72.0, None);
    let medium = profile("TX-M", 55.0, None);

    let mut strict = CaseManager::new(false);
    let case = strict.auto_trigger(&critical).unwrap().expect("critical triggers");
    assert_eq!(case.reason, "Automated Trigger: GEO_RISK");
    assert!(strict.auto_trigger(&high).unwrap().is_none());
    assert!(strict.auto_trigger(&medium).unwrap().is_none());
    assert!(strict.auto_trigger(&critical).unwrap().is_none(), "duplicate is quiet");
    assert_eq!(strict.all().len(), 1);

    let mut eager = CaseManager::new(true);
    let case = eager.auto_trigger(&high).unwrap().expect("policy on");
    assert_eq!(case.reason, "Automated Trigger: risk score 72.0");
}

/// Status filter and case-insensitive search combine.
#[test]
fn list_filter_and_counts() {
    let mut cases = CaseManager::new(false);
    let a = cases.generate("TX-100", "CUST-A", "Layering via shell", &[]).unwrap();
    cases.generate("TX-200", "CUST-B", "Structuring", &[]).unwrap();
    cases.generate("TX-300", "CUST-C", "Shell company payments", &[]).unwrap();
    cases.file(&a.id).unwrap();

    let shell = cases.list(&CaseFilter { status: None, search: "SHELL".into() });
    assert_eq!(shell.len(), 2);

    let pending_shell = cases.list(&CaseFilter { status: Some(StrStatus::Pending), search: "shell".into() });
    assert_eq!(pending_shell.len(), 1);
    assert_eq!(pending_shell[0].transaction_id, "TX-300");

    let by_customer = cases.list(&CaseFilter { status: None, search: "cust-b".into() });
    assert_eq!(by_customer.len(), 1);
    assert_eq!(cases.list(&CaseFilter::default()).len(), 3);

    let counts = cases.status_counts();
    assert_eq!((counts.pending, counts.filed, counts.dismissed), (2, 1, 0));
}

struct CannedNarrative(&'static str);

#[async_trait(?Send)]
impl NarrativeService for CannedNarrative {
    async fn narrate(&self, request: &NarrativeRequest<'_>) -> anyhow::Result<String> {
        assert!(request.prompt().contains(&request.case.id));
        Ok(self.0.to_string())
    }
}

/// A working narrator's text is stored; status is not touched.
#[tokio::test]
async fn narrative_is_attached() {
    let mut cases = CaseManager::new(false);
    let p = profile("TX-1", 90.0, Some("['ROUND_NUMBER']"));
    let case = cases.generate_for_profile(&p, &ManualTrigger::default()).unwrap();

    let service = CannedNarrative("Funds moved through three shells in one hour. Freeze.");
    let text = cases.attach_narrative(&case.id, &service, Some(&p), None).await.unwrap();
    assert!(text.starts_with("Funds moved"));
    let stored = cases.get(&case.id).unwrap();
    assert_eq!(stored.narrative.as_deref(), Some(text.as_str()));
    assert_eq!(stored.status, StrStatus::Pending);
}

/// Failing or empty narrators degrade to the fallback text.
#[tokio::test]
async fn narrative_falls_back() {
    let mut cases = CaseManager::new(false);
    let case = cases.generate("TX-1", "C1", "r", &[]).unwrap();

    let text = cases.attach_narrative(&case.id, &UnconfiguredNarrative, None, None).await.unwrap();
    assert_eq!(text, NARRATIVE_FALLBACK);

    let text = cases.attach_narrative(&case.id, &CannedNarrative("   "), None, None).await.unwrap();
    assert_eq!(text, NARRATIVE_FALLBACK);
    assert_eq!(cases.get(&case.id).unwrap().narrative.as_deref(), Some(NARRATIVE_FALLBACK));

    assert!(matches!(
        cases.attach_narrative("STR-NOPE", &UnconfiguredNarrative, None, None).await,
        Err(ConsoleError::CaseNotFound { .. })
    ));
}
