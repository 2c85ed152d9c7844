//! Profile Store Access as an async capability.
//!
//! Every fetch and count is a suspension point for the caller. Two
//! implementations: the local SQLite `ProfileStore`, and `HttpProfileSource`
//! for a remote store behind the `/transactions` and `/customers` endpoints.

use crate::{
    error::{ConsoleError, ConsoleResult},
    query::QueryCriteria,
    store::{ProfileStore, StoredProfile},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use std::{marker::PhantomData, time::Duration};

#[async_trait(?Send)]
pub trait ProfileSource<P> {
    /// One ordered page of profiles.
    async fn fetch_page(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<P>>;

    /// Total rows matching the filter part of `criteria`.
    async fn count(&self, criteria: &QueryCriteria) -> ConsoleResult<u64>;
}

#[async_trait(?Send)]
impl<P, S> ProfileSource<P> for &S
where
    P: 'static,
    S: ProfileSource<P> + ?Sized,
{
    async fn fetch_page(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<P>> {
        (**self).fetch_page(criteria).await
    }

    async fn count(&self, criteria: &QueryCriteria) -> ConsoleResult<u64> {
        (**self).count(criteria).await
    }
}

#[async_trait(?Send)]
impl<P: StoredProfile + 'static> ProfileSource<P> for ProfileStore {
    async fn fetch_page(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<P>> {
        self.query_profiles::<P>(criteria)
    }

    async fn count(&self, criteria: &QueryCriteria) -> ConsoleResult<u64> {
        self.count_profiles(P::KIND, criteria)
    }
}

// ── HTTP source ──────────────────────────────────────────────────────────────

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a remote profile store.
///
/// `GET {base}/{kind}?search=&risk_filter=&limit=&offset=` returns a JSON
/// array of profiles; `GET {base}/{kind}/count?...` returns the count.
pub struct HttpProfileSource<P> {
    base_url: String,
    client: reqwest::Client,
    _profile: PhantomData<fn() -> P>,
}

impl<P: StoredProfile> HttpProfileSource<P> {
    pub fn new(base_url: &str) -> ConsoleResult<Self> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ConsoleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsoleError::StoreUnavailable { reason: e.to_string() })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            _profile: PhantomData,
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}{suffix}", self.base_url, P::KIND.endpoint())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        pairs: Vec<(&'static str, String)>,
    ) -> ConsoleResult<T> {
        let unavailable = |e: reqwest::Error| ConsoleError::StoreUnavailable { reason: e.to_string() };
        let response = self
            .client
            .get(&url)
            .query(&pairs)
            .send()
            .await
            .map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConsoleError::StoreUnavailable {
                reason: format!("GET {url} returned {status}"),
            });
        }
        response.json::<T>().await.map_err(unavailable)
    }
}

#[async_trait(?Send)]
impl<P> ProfileSource<P> for HttpProfileSource<P>
where
    P: StoredProfile + DeserializeOwned + 'static,
{
    async fn fetch_page(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<P>> {
        self.get_json(self.url(""), criteria.to_query_pairs()).await
    }

    async fn count(&self, criteria: &QueryCriteria) -> ConsoleResult<u64> {
        let body: CountBody = self
            .get_json(self.url("/count"), criteria.without_window().to_query_pairs())
            .await?;
        body.count()
    }
}

/// Count responses arrive either as `{count}` or as the single-row
/// `[{count}]` a SQL driver returns, with the count as a number or as a
/// numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CountBody {
    Row(CountRow),
    Rows(Vec<CountRow>),
}

#[derive(Debug, Deserialize)]
pub struct CountRow {
    count: CountValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountValue {
    Number(u64),
    Text(String),
}

impl CountBody {
    pub fn count(&self) -> ConsoleResult<u64> {
        let row = match self {
            CountBody::Row(row) => row,
            CountBody::Rows(rows) => rows.first().ok_or_else(|| ConsoleError::StoreUnavailable {
                reason: "count response had no rows".into(),
            })?,
        };
        match &row.count {
            CountValue::Number(n) => Ok(*n),
            CountValue::Text(s) => s.trim().parse().map_err(|_| ConsoleError::StoreUnavailable {
                reason: format!("count '{s}' is not a number"),
            }),
        }
    }
}
