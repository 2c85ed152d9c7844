use super::{ProfileStore, StoredProfile};
use crate::{error::ConsoleResult, profile::CustomerRiskProfile, types::ProfileKind};
use rusqlite::{named_params, OptionalExtension, Row};

impl StoredProfile for CustomerRiskProfile {
    const KIND: ProfileKind = ProfileKind::Customer;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            profile_id:                       row.get("profile_id")?,
            customer_id:                      row.get("customer_id")?,
            account_no:                       row.get("account_no")?,
            full_name:                        row.get("full_name")?,
            peer_profile_occupation:          row.get("peer_profile_occupation")?,
            peer_profile_region:              row.get("peer_profile_region")?,
            peer_profile_account_age:         row.get("peer_profile_account_age")?,
            time_series_gap:                  row.get("time_series_gap")?,
            kyc_integrity_uniqueness:         row.get("kyc_integrity_uniqueness")?,
            kyc_integrity_completeness_ratio: row.get("kyc_integrity_completeness_ratio")?,
            demographics_risk:                row.get("demographics_risk")?,
            sanction_hits:                    row.get("sanction_hits")?,
            watchlist_hits:                   row.get("watchlist_hits")?,
            pep_hits:                         row.get("pep_hits")?,
            risk_score:                       row.get("risk_score")?,
            risk_level:                       row.get("risk_level")?,
            review_frequency_days:            row.get("review_frequency_days")?,
            last_review_date:                 row.get("last_review_date")?,
            next_review_date:                 row.get("next_review_date")?,
            reason_codes_json:                row.get("reason_codes_json")?,
            status:                           row.get("status")?,
            created_at:                       row.get("created_at")?,
            updated_at:                       row.get("updated_at")?,
            account_age:                      row.get("account_age")?,
            occupation:                       row.get("occupation")?,
            region:                           row.get("region")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCustomerProfile {
    pub customer_id: Option<String>,
    pub account_no: String,
    pub full_name: String,
    pub kyc_integrity_completeness_ratio: f64,
    pub sanction_hits: Option<String>,
    pub watchlist_hits: Option<String>,
    pub pep_hits: Option<String>,
    pub risk_score: Option<f64>,
    pub reason_codes_json: Option<String>,
    pub occupation: Option<String>,
    pub region: Option<String>,
    pub created_at: String,
}

impl ProfileStore {
    pub fn insert_customer_profile(&self, c: &NewCustomerProfile) -> ConsoleResult<i64> {
        self.conn.execute(
            "INSERT INTO customer_risk_profiles (
                customer_id, account_no, full_name, kyc_integrity_completeness_ratio,
                sanction_hits, watchlist_hits, pep_hits, risk_score, risk_level,
                reason_codes_json, occupation, region, created_at
            ) VALUES (
                :customer_id, :account_no, :full_name, :kyc,
                :sanction_hits, :watchlist_hits, :pep_hits, :score, :risk_level,
                :reason_codes, :occupation, :region, :created_at
            )",
            named_params! {
                ":customer_id":    c.customer_id,
                ":account_no":     c.account_no,
                ":full_name":      c.full_name,
                ":kyc":            c.kyc_integrity_completeness_ratio,
                ":sanction_hits":  c.sanction_hits,
                ":watchlist_hits": c.watchlist_hits,
                ":pep_hits":       c.pep_hits,
                ":score":          c.risk_score,
                ":risk_level":     c.risk_score.map(|s| crate::risk_band::classify(s).as_str()),
                ":reason_codes":   c.reason_codes_json,
                ":occupation":     c.occupation,
                ":region":         c.region,
                ":created_at":     c.created_at,
            },
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Customer profile by customer id, falling back to account number.
    pub fn customer_profile(&self, customer_key: &str) -> ConsoleResult<Option<CustomerRiskProfile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT * FROM customer_risk_profiles
                 WHERE customer_id = ?1 OR account_no = ?1
                 ORDER BY created_at DESC LIMIT 1",
                [customer_key],
                CustomerRiskProfile::from_row,
            )
            .optional()?;
        Ok(profile)
    }
}
