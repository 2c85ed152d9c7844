//! Query builder: SQL shape and bound parameters.

use amlwatch_core::{
    query::{QueryBuilder, QueryCriteria, RawCriteria, SqlValue},
    risk_band::RiskBand,
    types::ProfileKind,
};

/// No filter means no WHERE clause and recency ordering.
#[test]
fn empty_criteria_selects_everything() {
    let q = QueryBuilder::build(&QueryCriteria::default(), ProfileKind::Transaction, false);
    assert_eq!(
        q.sql,
        "SELECT * FROM \"transaction_risk_profiles\" ORDER BY \"generated_at\" DESC"
    );
    assert!(q.params.is_empty());
}

/// A band filter binds exactly two parameters and orders by score first.
#[test]
fn band_filter_binds_lower_and_upper() {
    let q = QueryBuilder::build(&QueryCriteria::band(RiskBand::High), ProfileKind::Customer, false);
    assert!(q.sql.contains("\"risk_score\" >= ?1"), "{}", q.sql);
    assert!(q.sql.contains("\"risk_score\" < ?2"), "{}", q.sql);
    assert!(q.sql.ends_with("ORDER BY \"risk_score\" DESC, \"created_at\" DESC"), "{}", q.sql);
    assert_eq!(q.params, vec![SqlValue::Real(70.0), SqlValue::Real(85.0)]);
}

/// Open band sides bind NULL rather than a sentinel number.
#[test]
fn open_band_sides_bind_null() {
    let low = QueryBuilder::build(&QueryCriteria::band(RiskBand::Low), ProfileKind::Transaction, false);
    assert_eq!(low.params, vec![SqlValue::Null, SqlValue::Real(50.0)]);

    let critical = QueryBuilder::build(&QueryCriteria::band(RiskBand::Critical), ProfileKind::Transaction, false);
    assert_eq!(critical.params, vec![SqlValue::Real(85.0), SqlValue::Null]);
}

/// The search term is bound once and referenced from both identity columns.
#[test]
fn search_reuses_one_placeholder() {
    let q = QueryBuilder::build(&QueryCriteria::search("Abebe"), ProfileKind::Customer, false);
    assert!(q.sql.contains("\"full_name\" LIKE ?1"), "{}", q.sql);
    assert!(q.sql.contains("\"account_no\" LIKE ?1"), "{}", q.sql);
    assert_eq!(q.params, vec![SqlValue::Text("%Abebe%".into())]);
}

/// Band and search combine with OR.
#[test]
fn band_and_search_are_unioned() {
    let criteria = QueryCriteria {
        search_term: "ER".into(),
        risk_band:   Some(RiskBand::Medium),
        limit:       None,
        offset:      None,
    };
    let q = QueryBuilder::build(&criteria, ProfileKind::Transaction, false);
    assert!(q.sql.contains(") OR ("), "{}", q.sql);
    assert!(q.sql.contains("\"from_name\" LIKE ?3"), "{}", q.sql);
    assert!(q.sql.contains("\"from_account\" LIKE ?3"), "{}", q.sql);
    assert_eq!(q.params.len(), 3);
}

/// Whitespace-only search is no search.
#[test]
fn blank_search_is_ignored() {
    let q = QueryBuilder::build(&QueryCriteria::search("   "), ProfileKind::Customer, false);
    assert!(!q.sql.contains("WHERE"), "{}", q.sql);
    assert!(q.params.is_empty());
}

/// LIKE wildcards in the term match literally.
#[test]
fn like_wildcards_are_escaped() {
    let q = QueryBuilder::build(&QueryCriteria::search("50%_off\\"), ProfileKind::Customer, false);
    assert_eq!(q.params, vec![SqlValue::Text("%50\\%\\_off\\\\%".into())]);
    assert!(q.sql.contains("ESCAPE '\\'"), "{}", q.sql);
}

/// Limit and offset are trailing parameters.
#[test]
fn window_is_appended_last() {
    let criteria = QueryCriteria::band(RiskBand::High).with_window(10, 20);
    let q = QueryBuilder::build(&criteria, ProfileKind::Transaction, false);
    assert!(q.sql.ends_with("LIMIT ?3 OFFSET ?4"), "{}", q.sql);
    assert_eq!(q.params[2], SqlValue::Integer(10));
    assert_eq!(q.params[3], SqlValue::Integer(20));
}

/// An offset without a limit still produces valid SQLite.
#[test]
fn offset_only_uses_unbounded_limit() {
    let criteria = QueryCriteria {
        offset: Some(5),
        ..QueryCriteria::default()
    };
    let q = QueryBuilder::build(&criteria, ProfileKind::Customer, false);
    assert!(q.sql.ends_with("LIMIT -1 OFFSET ?1"), "{}", q.sql);
    assert_eq!(q.params, vec![SqlValue::Integer(5)]);
}

/// Count queries drop ordering and window but keep the filter.
#[test]
fn count_query_ignores_window() {
    let criteria = QueryCriteria::band(RiskBand::Critical).with_window(10, 30);
    let q = QueryBuilder::build(&criteria, ProfileKind::Transaction, true);
    assert!(q.sql.starts_with("SELECT COUNT(*) AS count FROM \"transaction_risk_profiles\" WHERE"));
    assert!(!q.sql.contains("ORDER BY"));
    assert!(!q.sql.contains("LIMIT"));
    assert_eq!(q.params.len(), 2);
}

/// Loose query-string criteria drop malformed values instead of failing.
#[test]
fn raw_criteria_normalize_silently() {
    let raw = RawCriteria {
        search:      Some("kebede".into()),
        risk_filter: Some("extreme".into()),
        limit:       Some("ten".into()),
        offset:      Some("-3".into()),
    };
    let criteria = QueryCriteria::from(raw);
    assert_eq!(criteria.search_term, "kebede");
    assert_eq!(criteria.risk_band, None);
    assert_eq!(criteria.limit, None);
    assert_eq!(criteria.offset, None);

    let raw = RawCriteria {
        search:      None,
        risk_filter: Some("high".into()),
        limit:       Some("25".into()),
        offset:      Some("50".into()),
    };
    let criteria = QueryCriteria::from(raw);
    assert_eq!(criteria.risk_band, Some(RiskBand::High));
    assert_eq!(criteria.limit, Some(25));
    assert_eq!(criteria.offset, Some(50));
}
