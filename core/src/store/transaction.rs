use super::{ProfileStore, StoredProfile};
use crate::{error::ConsoleResult, profile::TransactionRiskProfile, types::ProfileKind};
use rusqlite::{named_params, Row};

impl StoredProfile for TransactionRiskProfile {
    const KIND: ProfileKind = ProfileKind::Transaction;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id:                          row.get("id")?,
            transaction_id:              row.get("transaction_id")?,
            from_account:                row.get("from_account")?,
            from_name:                   row.get("from_name")?,
            to_account:                  row.get("to_account")?,
            to_name:                     row.get("to_name")?,
            amount:                      row.get("amount")?,
            transaction_type:            row.get("transaction_type")?,
            transaction_time:            row.get("transaction_time")?,
            frequency_1hr:               row.get("frequency_1hr")?,
            frequency_24hr:              row.get("frequency_24hr")?,
            frequency_7days:             row.get("frequency_7days")?,
            time_window_1hr:             row.get("time_window_1hr")?,
            time_window_24hr:            row.get("time_window_24hr")?,
            time_window_7days:           row.get("time_window_7days")?,
            variance_24hr:               row.get("variance_24hr")?,
            variance_7days:              row.get("variance_7days")?,
            z_score_individual:          row.get("z_score_individual")?,
            z_score_branch:              row.get("z_score_branch")?,
            z_score_population:          row.get("z_score_population")?,
            percentile_branch:           row.get("percentile_branch")?,
            percentile_transaction_type: row.get("percentile_transaction_type")?,
            turnover_ratio_24hr:         row.get("turnover_ratio_24hr")?,
            turnover_ratio_7days:        row.get("turnover_ratio_7days")?,
            leading_digit_distribution:  row.get("leading_digit_distribution")?,
            round_number_hoarding:       row.get("round_number_hoarding")?,
            transaction_geography_risk:  row.get("transaction_geography_risk")?,
            overall_risk_score:          row.get("overall_risk_score")?,
            risk_level:                  row.get("risk_level")?,
            reason_codes:                row.get("reason_codes")?,
            generated_at:                row.get("generated_at")?,
        })
    }
}

/// Minimal transaction profile as written by the analysis engine.
/// Statistical columns not set here keep their schema defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTransactionProfile {
    pub transaction_id: String,
    pub from_account: String,
    pub from_name: String,
    pub to_account: String,
    pub to_name: String,
    pub amount: f64,
    pub transaction_type: String,
    pub overall_risk_score: Option<f64>,
    pub reason_codes: Option<String>,
    pub generated_at: String,
}

impl ProfileStore {
    /// Insert a transaction profile. The console never writes profiles in
    /// normal operation; this exists for loaders and tests.
    pub fn insert_transaction_profile(&self, p: &NewTransactionProfile) -> ConsoleResult<i64> {
        self.conn.execute(
            "INSERT INTO transaction_risk_profiles (
                transaction_id, from_account, from_name, to_account, to_name,
                amount, transaction_type, overall_risk_score, risk_level,
                reason_codes, generated_at
            ) VALUES (
                :transaction_id, :from_account, :from_name, :to_account, :to_name,
                :amount, :transaction_type, :score, :risk_level,
                :reason_codes, :generated_at
            )",
            named_params! {
                ":transaction_id":   p.transaction_id,
                ":from_account":     p.from_account,
                ":from_name":        p.from_name,
                ":to_account":       p.to_account,
                ":to_name":          p.to_name,
                ":amount":           p.amount,
                ":transaction_type": p.transaction_type,
                ":score":            p.overall_risk_score,
                ":risk_level":       p.overall_risk_score.map(|s| crate::risk_band::classify(s).as_str()),
                ":reason_codes":     p.reason_codes,
                ":generated_at":     p.generated_at,
            },
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Look up one transaction profile by its upstream transaction id.
    pub fn transaction_profile(&self, transaction_id: &str) -> ConsoleResult<Option<TransactionRiskProfile>> {
        use rusqlite::OptionalExtension;
        let profile = self
            .conn
            .query_row(
                "SELECT * FROM transaction_risk_profiles
                 WHERE transaction_id = ?1
                 ORDER BY generated_at DESC LIMIT 1",
                [transaction_id],
                TransactionRiskProfile::from_row,
            )
            .optional()?;
        Ok(profile)
    }
}
