//! Suspicious Transaction Report (STR) lifecycle.
//!
//! RULES:
//!   - At most one STR per transaction id. A second attempt is rejected
//!     with `DuplicateCase` and changes nothing.
//!   - PENDING → FILED and PENDING → DISMISSED are the only transitions.
//!     FILED and DISMISSED are terminal.
//!   - Cases are never deleted. The list is kept most-recent-first.

use crate::{
    error::{ConsoleError, ConsoleResult},
    narrative::{narrate_or_fallback, NarrativeRequest, NarrativeService},
    profile::{CustomerRiskProfile, RiskProfile, TransactionRiskProfile},
    risk_band::RiskBand,
    types::{CaseId, CustomerId, TransactionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MANUAL_TRIGGER_REASON: &str = "Manual Trigger by Analyst";
const AUTOMATED_TRIGGER_PREFIX: &str = "Automated Trigger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrStatus {
    Pending,
    Filed,
    Dismissed,
}

impl StrStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StrStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrStatus::Pending   => "PENDING",
            StrStatus::Filed     => "FILED",
            StrStatus::Dismissed => "DISMISSED",
        }
    }
}

impl fmt::Display for StrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Suspicious Transaction Report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Str {
    pub id:             CaseId,
    pub transaction_id: TransactionId,
    pub customer_id:    CustomerId,
    pub generated_at:   DateTime<Utc>,
    pub reason:         String,
    pub status:         StrStatus,
    pub narrative:      Option<String>,
}

/// Case list filter. `status: None` means all statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFilter {
    #[serde(default)]
    pub status: Option<StrStatus>,
    #[serde(default)]
    pub search: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending:   usize,
    pub filed:     usize,
    pub dismissed: usize,
}

/// Reconcile a caller-supplied reason with machine flags. Flags already
/// present verbatim in the reason are not repeated.
pub fn compose_reason(reason: &str, flags: &[String]) -> String {
    let reason = reason.trim();
    let mut extra: Vec<&str> = Vec::new();
    for flag in flags.iter().map(|f| f.trim()) {
        if !flag.is_empty() && !reason.contains(flag) && !extra.contains(&flag) {
            extra.push(flag);
        }
    }

    match (reason.is_empty(), extra.is_empty()) {
        (_, true)     => reason.to_string(),
        (true, false) => format!("{AUTOMATED_TRIGGER_PREFIX}: {}", extra.join(", ")),
        (false, false) => format!("{reason} | Flags: {}", extra.join(", ")),
    }
}

/// Analyst input for a manual STR. Empty fields fall back to the profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTrigger<'a> {
    pub customer_id: Option<&'a str>,
    pub reason:      Option<&'a str>,
    pub flags:       &'a [String],
}

pub struct CaseManager {
    cases:                  Vec<Str>,
    high_band_auto_trigger: bool,
}

impl CaseManager {
    pub fn new(high_band_auto_trigger: bool) -> Self {
        Self {
            cases: Vec::new(),
            high_band_auto_trigger,
        }
    }

    /// Raise a new PENDING case for `transaction_id`.
    pub fn generate(
        &mut self,
        transaction_id: &str,
        customer_id: &str,
        reason: &str,
        flags: &[String],
    ) -> ConsoleResult<Str> {
        let case = self.prepare(transaction_id, customer_id, reason, flags)?;
        self.commit(case.clone());
        Ok(case)
    }

    /// Build a PENDING case without storing it. Fails with `DuplicateCase`
    /// exactly when `generate` would.
    pub fn prepare(
        &self,
        transaction_id: &str,
        customer_id: &str,
        reason: &str,
        flags: &[String],
    ) -> ConsoleResult<Str> {
        if let Some(existing) = self.find_by_transaction(transaction_id) {
            log::info!("STR already exists for transaction {transaction_id}: {}", existing.id);
            return Err(ConsoleError::DuplicateCase {
                transaction_id:   transaction_id.to_string(),
                existing_case_id: existing.id.clone(),
            });
        }

        Ok(Str {
            id:             new_case_id(),
            transaction_id: transaction_id.to_string(),
            customer_id:    customer_id.to_string(),
            generated_at:   Utc::now(),
            reason:         compose_reason(reason, flags),
            status:         StrStatus::Pending,
            narrative:      None,
        })
    }

    /// Store a case from `prepare`. Newest first.
    pub fn commit(&mut self, case: Str) {
        log::info!("STR {} generated for transaction {}", case.id, case.transaction_id);
        self.cases.insert(0, case);
    }

    /// Analyst-initiated case from a transaction profile.
    pub fn generate_for_profile(
        &mut self,
        profile: &TransactionRiskProfile,
        manual: &ManualTrigger<'_>,
    ) -> ConsoleResult<Str> {
        let case = self.prepare_for_profile(profile, manual)?;
        self.commit(case.clone());
        Ok(case)
    }

    /// The analyst's customer id wins over the profile's account; the
    /// analyst's flags are appended to the engine's reason codes.
    pub fn prepare_for_profile(
        &self,
        profile: &TransactionRiskProfile,
        manual: &ManualTrigger<'_>,
    ) -> ConsoleResult<Str> {
        let reason = manual
            .reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(MANUAL_TRIGGER_REASON);
        let customer_id = manual
            .customer_id
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(profile.from_account.as_str());
        let mut flags = profile.reason_codes();
        flags.extend(manual.flags.iter().cloned());
        self.prepare(&profile.transaction_id, customer_id, reason, &flags)
    }

    /// Raise a case for a freshly scored profile if its band calls for one.
    /// CRITICAL always does; HIGH only under the auto-trigger policy.
    /// An existing case for the transaction yields `Ok(None)`.
    pub fn auto_trigger(&mut self, profile: &TransactionRiskProfile) -> ConsoleResult<Option<Str>> {
        let case = self.prepare_auto_trigger(profile)?;
        if let Some(case) = &case {
            self.commit(case.clone());
        }
        Ok(case)
    }

    pub fn prepare_auto_trigger(&self, profile: &TransactionRiskProfile) -> ConsoleResult<Option<Str>> {
        let triggers = match profile.band() {
            Some(RiskBand::Critical) => true,
            Some(RiskBand::High)     => self.high_band_auto_trigger,
            _                        => false,
        };
        if !triggers {
            return Ok(None);
        }

        let flags = profile.reason_codes();
        let reason = if flags.is_empty() {
            format!(
                "{AUTOMATED_TRIGGER_PREFIX}: risk score {:.1}",
                profile.overall_risk_score.unwrap_or_default()
            )
        } else {
            String::new()
        };

        match self.prepare(&profile.transaction_id, &profile.from_account, &reason, &flags) {
            Ok(case) => Ok(Some(case)),
            Err(e) if e.is_duplicate_case() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn file(&mut self, case_id: &str) -> ConsoleResult<StrStatus> {
        self.transition(case_id, StrStatus::Filed)
    }

    pub fn dismiss(&mut self, case_id: &str) -> ConsoleResult<StrStatus> {
        self.transition(case_id, StrStatus::Dismissed)
    }

    /// Move a PENDING case to `to`. Returns the previous status.
    fn transition(&mut self, case_id: &str, to: StrStatus) -> ConsoleResult<StrStatus> {
        let case = self
            .cases
            .iter_mut()
            .find(|c| c.id == case_id)
            .ok_or_else(|| ConsoleError::CaseNotFound { case_id: case_id.to_string() })?;

        if case.status.is_terminal() {
            return Err(ConsoleError::InvalidTransition {
                case_id: case_id.to_string(),
                from:    case.status,
                to,
            });
        }
        let from = case.status;
        case.status = to;
        log::info!("STR {case_id}: {from} -> {to}");
        Ok(from)
    }

    pub fn get(&self, case_id: &str) -> ConsoleResult<&Str> {
        self.cases
            .iter()
            .find(|c| c.id == case_id)
            .ok_or_else(|| ConsoleError::CaseNotFound { case_id: case_id.to_string() })
    }

    pub fn find_by_transaction(&self, transaction_id: &str) -> Option<&Str> {
        self.cases.iter().find(|c| c.transaction_id == transaction_id)
    }

    /// Cases matching `filter`, most recent first. Search is
    /// case-insensitive over id, reason, transaction id and customer id.
    pub fn list(&self, filter: &CaseFilter) -> Vec<&Str> {
        let needle = filter.search.trim().to_lowercase();
        self.cases
            .iter()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| {
                needle.is_empty()
                    || [&c.id, &c.reason, &c.transaction_id, &c.customer_id]
                        .iter()
                        .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn all(&self) -> &[Str] {
        &self.cases
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for case in &self.cases {
            match case.status {
                StrStatus::Pending   => counts.pending += 1,
                StrStatus::Filed     => counts.filed += 1,
                StrStatus::Dismissed => counts.dismissed += 1,
            }
        }
        counts
    }

    /// Ask the narrative service for a risk narrative and store it on the
    /// case. Service failures store the fallback text instead. Status is
    /// never touched.
    pub async fn attach_narrative(
        &mut self,
        case_id: &str,
        service: &dyn NarrativeService,
        transaction: Option<&TransactionRiskProfile>,
        customer: Option<&CustomerRiskProfile>,
    ) -> ConsoleResult<String> {
        let case = self.get(case_id)?.clone();
        let request = NarrativeRequest {
            case: &case,
            transaction,
            customer,
        };
        let text = narrate_or_fallback(service, &request).await;

        if let Some(stored) = self.cases.iter_mut().find(|c| c.id == case_id) {
            stored.narrative = Some(text.clone());
        }
        Ok(text)
    }
}

fn new_case_id() -> CaseId {
    let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("STR-{}", &id[..12])
}
