//! Pagination over a profile source.
//!
//! `PaginationController` is sans-I/O: it turns analyst input into
//! `PageRequest`s and folds results back in. `Pager` is the async driver
//! that executes requests against a `ProfileSource`.
//!
//! RULES:
//!   - Every request carries a generation. Only the latest generation may
//!     be applied; anything older is discarded on arrival.
//!   - Changing the search term or band resets `current_page` to 1.
//!   - Page navigation moves `current_page` only after its fetch succeeds.
//!   - A failed fetch or count leaves the displayed page untouched.

use crate::{
    error::{ConsoleError, ConsoleResult},
    query::QueryCriteria,
    risk_band::RiskBand,
    source::ProfileSource,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::{
    cell::{Ref, RefCell},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    time::{sleep_until, Instant},
};

pub const DEFAULT_ITEMS_PER_PAGE: u64 = 10;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

// ── Debounce ─────────────────────────────────────────────────────────────────

/// Holds typed search text until the input has been quiet for `window`.
#[derive(Debug)]
pub struct SearchDebouncer {
    window:  Duration,
    pending: Option<(String, Instant)>,
}

impl SearchDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: None }
    }

    /// Record a keystroke. Restarts the quiet window.
    pub fn input(&mut self, text: impl Into<String>, now: Instant) {
        self.pending = Some((text.into(), now + self.window));
    }

    /// When the pending text becomes committable, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Take the pending text once its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, at)) if *at <= now => self.pending.take().map(|(text, _)| text),
            _ => None,
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// One count + fetch to perform. `criteria` already carries the window.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub generation: u64,
    pub page:       u64,
    pub criteria:   QueryCriteria,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<P> {
    pub total_count: u64,
    pub rows:        Vec<P>,
}

#[derive(Debug)]
pub enum ApplyOutcome {
    Applied,
    /// Superseded by a later request; nothing changed.
    Stale,
    /// Navigation ran past the last row. Count updated, page not advanced.
    Exhausted,
    /// Fetch or count failed. Displayed page unchanged.
    Failed(ConsoleError),
}

/// Snapshot of what the analyst sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView<P> {
    pub current_page:      u64,
    pub items_per_page:    u64,
    pub total_count:       Option<u64>,
    pub total_pages:       Option<u64>,
    pub has_next_page:     bool,
    pub has_previous_page: bool,
    pub search_term:       String,
    pub risk_band:         Option<RiskBand>,
    pub rows:              Vec<P>,
    pub loading:           bool,
    pub last_error:        Option<String>,
}

#[derive(Debug)]
pub struct PaginationController<P> {
    current_page:   u64,
    items_per_page: u64,
    total_count:    Option<u64>,
    search_term:    String,
    risk_band:      Option<RiskBand>,
    rows:           Vec<P>,
    generation:     u64,
    loading:        bool,
    last_error:     Option<String>,
}

impl<P> PaginationController<P> {
    pub fn new(items_per_page: u64) -> Self {
        Self {
            current_page:   1,
            items_per_page: items_per_page.max(1),
            total_count:    None,
            search_term:    String::new(),
            risk_band:      None,
            rows:           Vec::new(),
            generation:     0,
            loading:        false,
            last_error:     None,
        }
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn rows(&self) -> &[P] {
        &self.rows
    }

    /// Latest generation issued.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.total_count.map(|n| n.div_ceil(self.items_per_page))
    }

    /// With no count yet, Next stays enabled and an empty page stops it.
    pub fn has_next_page(&self) -> bool {
        self.total_pages().map_or(true, |pages| self.current_page < pages)
    }

    pub fn has_previous_page(&self) -> bool {
        self.current_page > 1
    }

    /// Criteria for `page` under the committed filter.
    pub fn criteria_for(&self, page: u64) -> QueryCriteria {
        QueryCriteria {
            search_term: self.search_term.clone(),
            risk_band:   self.risk_band,
            limit:       Some(self.items_per_page),
            offset:      Some(page.saturating_sub(1) * self.items_per_page),
        }
    }

    /// Commit a debounced search term. `None` when unchanged after trimming.
    pub fn commit_search(&mut self, term: &str) -> Option<PageRequest> {
        let term = term.trim();
        if self.search_term == term {
            return None;
        }
        self.search_term = term.to_string();
        self.current_page = 1;
        Some(self.issue(1))
    }

    /// Select a band (or clear it). `None` when unchanged.
    pub fn select_band(&mut self, band: Option<RiskBand>) -> Option<PageRequest> {
        if self.risk_band == band {
            return None;
        }
        self.risk_band = band;
        self.current_page = 1;
        Some(self.issue(1))
    }

    pub fn next_page(&mut self) -> Option<PageRequest> {
        if !self.has_next_page() {
            return None;
        }
        Some(self.issue(self.current_page + 1))
    }

    pub fn previous_page(&mut self) -> Option<PageRequest> {
        if !self.has_previous_page() {
            return None;
        }
        Some(self.issue(self.current_page - 1))
    }

    /// Re-fetch the current page.
    pub fn request(&mut self) -> PageRequest {
        self.issue(self.current_page)
    }

    fn issue(&mut self, page: u64) -> PageRequest {
        self.generation += 1;
        self.loading = true;
        PageRequest {
            generation: self.generation,
            page,
            criteria:   self.criteria_for(page),
        }
    }

    /// Fold a finished request back in.
    pub fn apply(&mut self, request: &PageRequest, result: ConsoleResult<PageResult<P>>) -> ApplyOutcome {
        if request.generation != self.generation {
            log::debug!(
                "Discarding stale page {} (generation {} < {})",
                request.page, request.generation, self.generation
            );
            return ApplyOutcome::Stale;
        }
        self.loading = false;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Page {} failed: {e}", request.page);
                self.last_error = Some(e.to_string());
                return ApplyOutcome::Failed(e);
            }
        };
        self.last_error = None;
        self.total_count = Some(result.total_count);

        if result.rows.is_empty() && request.page > self.current_page {
            return ApplyOutcome::Exhausted;
        }
        self.current_page = request.page;
        self.rows = result.rows;
        ApplyOutcome::Applied
    }
}

impl<P: Clone> PaginationController<P> {
    pub fn view(&self) -> PageView<P> {
        PageView {
            current_page:      self.current_page,
            items_per_page:    self.items_per_page,
            total_count:       self.total_count,
            total_pages:       self.total_pages(),
            has_next_page:     self.has_next_page(),
            has_previous_page: self.has_previous_page(),
            search_term:       self.search_term.clone(),
            risk_band:         self.risk_band,
            rows:              self.rows.clone(),
            loading:           self.loading,
            last_error:        self.last_error.clone(),
        }
    }
}

// ── Async driver ─────────────────────────────────────────────────────────────

/// Analyst input fed to `Pager::run`.
#[derive(Debug, Clone, PartialEq)]
pub enum PagerInput {
    /// Raw keystrokes. Committed after the debounce window.
    SearchTyped(String),
    BandSelected(Option<RiskBand>),
    NextPage,
    PreviousPage,
    Refresh,
}

pub struct Pager<P, S> {
    source:     S,
    controller: RefCell<PaginationController<P>>,
    debounce:   Duration,
}

impl<P, S> Pager<P, S>
where
    P: Clone,
    S: ProfileSource<P>,
{
    pub fn new(source: S, items_per_page: u64, debounce: Duration) -> Self {
        Self {
            source,
            controller: RefCell::new(PaginationController::new(items_per_page)),
            debounce,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn controller(&self) -> Ref<'_, PaginationController<P>> {
        self.controller.borrow()
    }

    pub fn view(&self) -> PageView<P> {
        self.controller.borrow().view()
    }

    /// Run count and page fetch concurrently for `request`.
    pub async fn execute(&self, request: PageRequest) -> (PageRequest, ConsoleResult<PageResult<P>>) {
        let count_criteria = request.criteria.without_window();
        let (count, rows) = futures::join!(
            self.source.count(&count_criteria),
            self.source.fetch_page(&request.criteria),
        );
        let result = count.and_then(|total_count| rows.map(|rows| PageResult { total_count, rows }));
        (request, result)
    }

    async fn drive(&self, request: Option<PageRequest>) -> Option<ApplyOutcome> {
        let (request, result) = self.execute(request?).await;
        Some(self.controller.borrow_mut().apply(&request, result))
    }

    /// Re-fetch the current page and apply it.
    pub async fn refresh(&self) -> ApplyOutcome {
        let request = self.controller.borrow_mut().request();
        let (request, result) = self.execute(request).await;
        self.controller.borrow_mut().apply(&request, result)
    }

    /// Commit a search term immediately, bypassing the debouncer.
    pub async fn search(&self, term: &str) -> Option<ApplyOutcome> {
        let request = self.controller.borrow_mut().commit_search(term);
        self.drive(request).await
    }

    pub async fn select_band(&self, band: Option<RiskBand>) -> Option<ApplyOutcome> {
        let request = self.controller.borrow_mut().select_band(band);
        self.drive(request).await
    }

    pub async fn next_page(&self) -> Option<ApplyOutcome> {
        let request = self.controller.borrow_mut().next_page();
        self.drive(request).await
    }

    pub async fn previous_page(&self) -> Option<ApplyOutcome> {
        let request = self.controller.borrow_mut().previous_page();
        self.drive(request).await
    }

    /// Event loop: debounce typed text, keep requests overlapping, and
    /// publish every applied view. Returns once `inputs` is closed and all
    /// pending work has drained, or when every view receiver is gone.
    pub async fn run(&self, mut inputs: mpsc::Receiver<PagerInput>, views: watch::Sender<PageView<P>>) {
        let mut debouncer = SearchDebouncer::new(self.debounce);
        let mut in_flight = FuturesUnordered::new();
        let mut inputs_open = true;

        let initial = self.controller.borrow_mut().request();
        in_flight.push(self.execute(initial));

        loop {
            let deadline = debouncer.deadline();
            tokio::select! {
                input = inputs.recv(), if inputs_open => {
                    let request = match input {
                        None => {
                            inputs_open = false;
                            None
                        }
                        Some(PagerInput::SearchTyped(text)) => {
                            debouncer.input(text, Instant::now());
                            None
                        }
                        Some(PagerInput::BandSelected(band)) => self.controller.borrow_mut().select_band(band),
                        Some(PagerInput::NextPage)           => self.controller.borrow_mut().next_page(),
                        Some(PagerInput::PreviousPage)       => self.controller.borrow_mut().previous_page(),
                        Some(PagerInput::Refresh)            => Some(self.controller.borrow_mut().request()),
                    };
                    if let Some(request) = request {
                        in_flight.push(self.execute(request));
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(term) = debouncer.poll(Instant::now()) {
                        if let Some(request) = self.controller.borrow_mut().commit_search(&term) {
                            in_flight.push(self.execute(request));
                        }
                    }
                }
                Some((request, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    let outcome = self.controller.borrow_mut().apply(&request, result);
                    if matches!(outcome, ApplyOutcome::Stale) {
                        continue;
                    }
                    let view = self.controller.borrow().view();
                    if views.send(view).is_err() {
                        log::debug!("Pager view receivers gone; stopping");
                        break;
                    }
                }
                else => break,
            }
        }
    }
}
