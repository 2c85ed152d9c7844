//! Query builder for the profile tables.
//!
//! RULES:
//!   - Identifiers (tables, columns) come only from `ProfileKind`.
//!   - Every caller-supplied value is a bound parameter. Values never
//!     appear in SQL text.
//!   - Band filter and text search combine with OR: a row matches if it is
//!     in the selected band or matches the search. Callers rely on seeing
//!     both sets of hits together.

use crate::{risk_band::RiskBand, types::ProfileKind};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use serde::{Deserialize, Serialize};

/// Filter, order and window for one profile query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCriteria {
    #[serde(default)]
    pub search_term: String,
    #[serde(default)]
    pub risk_band: Option<RiskBand>,
    /// `None` means unbounded. No default is injected here.
    #[serde(default)]
    pub limit: Option<u64>,
    /// `None` means 0.
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryCriteria {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search_term: term.into(),
            ..Self::default()
        }
    }

    pub fn band(band: RiskBand) -> Self {
        Self {
            risk_band: Some(band),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// The search term with surrounding whitespace removed.
    pub fn trimmed_search(&self) -> &str {
        self.search_term.trim()
    }

    /// Same filter, without limit/offset. Used for count queries.
    pub fn without_window(&self) -> Self {
        Self {
            search_term: self.search_term.clone(),
            risk_band:   self.risk_band,
            limit:       None,
            offset:      None,
        }
    }

    /// Query-string pairs in the profile endpoint's wire form.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.trimmed_search().is_empty() {
            pairs.push(("search", self.trimmed_search().to_string()));
        }
        if let Some(band) = self.risk_band {
            pairs.push(("risk_filter", band.as_str().to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

/// Criteria exactly as received from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCriteria {
    pub search: Option<String>,
    pub risk_filter: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl From<RawCriteria> for QueryCriteria {
    /// Malformed values are dropped, never reported: a non-numeric or
    /// negative limit/offset is treated as absent, and an unrecognized
    /// `risk_filter` means no band filter.
    fn from(raw: RawCriteria) -> Self {
        let parse_window = |v: Option<String>| v.and_then(|s| s.trim().parse::<u64>().ok());
        Self {
            search_term: raw.search.unwrap_or_default(),
            risk_band:   raw.risk_filter.and_then(|s| s.parse().ok()),
            limit:       parse_window(raw.limit),
            offset:      parse_window(raw.offset),
        }
    }
}

// ── Bound values ─────────────────────────────────────────────────────────────

/// A value bound to a numbered placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null       => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r)    => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(t)    => ToSqlOutput::Borrowed(t.as_str().into()),
        })
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(SqlValue::Null, SqlValue::Real)
    }
}

/// SQL text plus its positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

// ── Predicate tree ───────────────────────────────────────────────────────────

/// Structured WHERE clause. Holds identifiers and placeholder numbers only.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `[?lower, ?upper)` on a score column; a NULL bound is open.
    ScoreRange {
        column: &'static str,
        lower: usize,
        upper: usize,
    },
    /// Case-insensitive contains on each column, all using one placeholder.
    Contains {
        columns: Vec<&'static str>,
        param: usize,
    },
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn render(&self) -> String {
        match self {
            Predicate::ScoreRange { column, lower, upper } => format!(
                "((?{lower} IS NULL OR \"{column}\" >= ?{lower}) AND (?{upper} IS NULL OR \"{column}\" < ?{upper}))"
            ),
            Predicate::Contains { columns, param } => {
                let parts: Vec<String> = columns
                    .iter()
                    .map(|c| format!("\"{c}\" LIKE ?{param} ESCAPE '\\'"))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Predicate::Or(a, b) => format!("({} OR {})", a.render(), b.render()),
        }
    }
}

/// Accumulates bound values and hands out placeholder numbers.
#[derive(Default)]
struct Binder {
    params: Vec<SqlValue>,
}

impl Binder {
    fn bind(&mut self, value: SqlValue) -> usize {
        self.params.push(value);
        self.params.len()
    }
}

/// Escape LIKE wildcards so the search term matches literally.
fn like_contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct QueryBuilder;

impl QueryBuilder {
    /// Build a page query (or a count query when `count_only`) for `kind`.
    /// Never fails: empty criteria select every row.
    pub fn build(criteria: &QueryCriteria, kind: ProfileKind, count_only: bool) -> BuiltQuery {
        let mut binder = Binder::default();

        let band_predicate = criteria.risk_band.map(|band| {
            let (lower, upper) = band.bounds();
            Predicate::ScoreRange {
                column: kind.score_column(),
                lower:  binder.bind(lower.into()),
                upper:  binder.bind(upper.into()),
            }
        });

        let term = criteria.trimmed_search();
        let search_predicate = (!term.is_empty()).then(|| Predicate::Contains {
            columns: kind.search_columns().to_vec(),
            param:   binder.bind(SqlValue::Text(like_contains_pattern(term))),
        });

        let predicate = match (band_predicate, search_predicate) {
            (Some(band), Some(search)) => Some(Predicate::Or(Box::new(band), Box::new(search))),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => None,
        };

        let projection = if count_only { "COUNT(*) AS count" } else { "*" };
        let mut sql = format!("SELECT {projection} FROM \"{}\"", kind.table());

        if let Some(p) = &predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&p.render());
        }

        if !count_only {
            let recency = kind.recency_column();
            if criteria.risk_band.is_some() {
                sql.push_str(&format!(
                    " ORDER BY \"{}\" DESC, \"{recency}\" DESC",
                    kind.score_column()
                ));
            } else {
                sql.push_str(&format!(" ORDER BY \"{recency}\" DESC"));
            }

            match (criteria.limit, criteria.offset) {
                (Some(limit), offset) => {
                    let n = binder.bind(SqlValue::Integer(clamp_i64(limit)));
                    sql.push_str(&format!(" LIMIT ?{n}"));
                    if let Some(offset) = offset {
                        let n = binder.bind(SqlValue::Integer(clamp_i64(offset)));
                        sql.push_str(&format!(" OFFSET ?{n}"));
                    }
                }
                // SQLite only accepts OFFSET after a LIMIT; -1 is unbounded.
                (None, Some(offset)) => {
                    let n = binder.bind(SqlValue::Integer(clamp_i64(offset)));
                    sql.push_str(&format!(" LIMIT -1 OFFSET ?{n}"));
                }
                (None, None) => {}
            }
        }

        BuiltQuery {
            sql,
            params: binder.params,
        }
    }
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
