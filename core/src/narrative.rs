//! AI narrative collaborator.
//!
//! The text generator itself lives outside this crate. This module owns
//! the contract: a failed or empty narration degrades to a fixed fallback
//! string and never surfaces as an error.

use crate::{
    cases::Str,
    profile::{CustomerRiskProfile, RiskProfile, TransactionRiskProfile},
};
use async_trait::async_trait;

pub const NARRATIVE_FALLBACK: &str = "AI Analysis Unavailable";

/// Everything a narrator may use to describe one case.
pub struct NarrativeRequest<'a> {
    pub case:        &'a Str,
    pub transaction: Option<&'a TransactionRiskProfile>,
    pub customer:    Option<&'a CustomerRiskProfile>,
}

impl NarrativeRequest<'_> {
    /// Analyst briefing sent to the text generator.
    pub fn prompt(&self) -> String {
        let mut prompt = String::from(
            "You are a senior financial crime analyst. Analyze the following \
             Suspicious Transaction Report (STR).\n",
        );
        prompt.push_str(&format!("\nReport {} (reason: {})\n", self.case.id, self.case.reason));

        if let Some(c) = self.customer {
            prompt.push_str("\nCustomer Context:\n");
            prompt.push_str(&format!("- ID: {}\n", c.customer_key()));
            prompt.push_str(&format!("- Occupation: {}\n", c.occupation.as_deref().unwrap_or("unknown")));
            prompt.push_str(&format!("- Region: {}\n", c.region.as_deref().unwrap_or("unknown")));
            if let Some(band) = c.band() {
                prompt.push_str(&format!("- Risk Level: {band}\n"));
            }
        }

        if let Some(t) = self.transaction {
            prompt.push_str("\nTransaction Details:\n");
            prompt.push_str(&format!("- Amount: {:.2}\n", t.amount));
            prompt.push_str(&format!("- Type: {}\n", t.transaction_type));
            prompt.push_str(&format!("- Counterparty: {} ({})\n", t.to_name, t.to_account));
            prompt.push_str(&format!("- Flags Triggered: {}\n", t.reason_codes().join(", ")));
        }

        prompt.push_str(
            "\nTask:\nProvide a concise 3-sentence risk narrative explaining why this \
             activity is suspicious based on the triggered flags and customer profile. \
             Recommend an immediate action (e.g., Freeze, RFI, Dismiss).\n",
        );
        prompt
    }
}

#[async_trait(?Send)]
pub trait NarrativeService {
    async fn narrate(&self, request: &NarrativeRequest<'_>) -> anyhow::Result<String>;
}

/// Narrator used when no text generator is configured.
pub struct UnconfiguredNarrative;

#[async_trait(?Send)]
impl NarrativeService for UnconfiguredNarrative {
    async fn narrate(&self, _request: &NarrativeRequest<'_>) -> anyhow::Result<String> {
        anyhow::bail!("no narrative service configured")
    }
}

pub async fn narrate_or_fallback(service: &dyn NarrativeService, request: &NarrativeRequest<'_>) -> String {
    match service.narrate(request).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            log::warn!("Narrative for {} came back empty", request.case.id);
            NARRATIVE_FALLBACK.to_string()
        }
        Err(e) => {
            log::warn!("Narrative for {} unavailable: {e}", request.case.id);
            NARRATIVE_FALLBACK.to_string()
        }
    }
}
