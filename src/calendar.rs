use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::*;
use crate::filter::{FilterKey, FilterState, Selection, SharedFilters, View};
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::source::{CalendarSource, ReservationQuery, SourceError};

#[derive(Debug)]
pub enum CalendarError {
    Fetch {
        resource: &'static str,
        source: SourceError,
    },
    Engine(EngineError),
    UnknownProperty(PropertyId),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::Fetch { resource, source } => {
                write!(f, "failed to fetch {resource}: {source}")
            }
            CalendarError::Engine(e) => write!(f, "{e}"),
            CalendarError::UnknownProperty(id) => write!(f, "unknown property: {id}"),
            CalendarError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for CalendarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalendarError::Fetch { source, .. } => Some(source),
            CalendarError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for CalendarError {
    fn from(e: EngineError) -> Self {
        CalendarError::Engine(e)
    }
}

fn fetch_failed(resource: &'static str) -> impl FnOnce(SourceError) -> CalendarError {
    move |source| {
        metrics::counter!(observability::FETCH_FAILURES_TOTAL, "resource" => resource).increment(1);
        CalendarError::Fetch { resource, source }
    }
}

// ── View ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyOccupancy {
    pub property_id: PropertyId,
    pub nights_booked: usize,
    pub rate: f64,
}

/// Everything the calendar displays for one applied filter state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub key: FilterKey,
    pub request_id: Ulid,
    pub window: DateSpan,
    pub view: View,
    pub properties: Vec<Property>,
    /// Display list: status filter applied, conflict flags computed over all.
    pub reservations: Vec<DecoratedReservation>,
    pub conflicts: Vec<Conflict>,
    pub occupancy: Vec<PropertyOccupancy>,
    /// Direct-channel nightly prices per property across the window.
    pub prices: BTreeMap<PropertyId, Vec<NightlyPrice>>,
    #[serde(skip)]
    pub price_book: PriceBook,
    #[serde(skip)]
    pub index: OccupancyIndex,
}

impl CalendarView {
    fn empty(key: FilterKey, request_id: Ulid, window: DateSpan, view: View) -> Self {
        Self {
            key,
            request_id,
            window,
            view,
            properties: Vec::new(),
            reservations: Vec::new(),
            conflicts: Vec::new(),
            occupancy: Vec::new(),
            prices: BTreeMap::new(),
            price_book: PriceBook::default(),
            index: OccupancyIndex::default(),
        }
    }

    /// Pure assembly from fetched data. Blocks join the reservations before
    /// indexing; the index and conflicts ignore the status filter.
    pub fn assemble(
        key: FilterKey,
        request_id: Ulid,
        state: &FilterState,
        window: DateSpan,
        properties: Vec<Property>,
        reservations: Vec<Reservation>,
        blocks: Vec<Block>,
        price_book: PriceBook,
    ) -> Self {
        let mut records = reservations;
        records.extend(blocks.into_iter().map(Block::into_reservation));
        records.retain(|r| r.check_in < window.end && r.check_out > window.start);

        let index = OccupancyIndex::build_within(&records, &window);
        let conflicts = find_conflicts(&index, &properties);
        let reservations = decorate_with_conflicts(&records, &index)
            .into_iter()
            .filter(|r| state.shows_reservation(&r.reservation))
            .collect();

        let occupancy = properties
            .iter()
            .map(|p| PropertyOccupancy {
                property_id: p.id.clone(),
                nights_booked: index.nights_booked(&p.id, &window),
                rate: index.occupancy_rate(&p.id, &window),
            })
            .collect();

        let prices = properties
            .iter()
            .map(|p| {
                let nightly = window
                    .dates()
                    .map(|date| NightlyPrice {
                        date,
                        price: price_book.quote(p, date, None).final_price,
                    })
                    .collect();
                (p.id.clone(), nightly)
            })
            .collect();

        Self {
            key,
            request_id,
            window,
            view: state.view,
            properties,
            reservations,
            conflicts,
            occupancy,
            prices,
            price_book,
            index,
        }
    }

    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    /// Resolve one (property, date) price for a channel using the view's rule set.
    pub fn quote(&self, property_id: &str, date: Date, platform: Option<&str>) -> Option<PriceQuote> {
        self.property(property_id)
            .map(|p| self.price_book.quote(p, date, platform))
    }
}

/// Outcome of a refresh that did not fail.
#[derive(Debug, Clone)]
pub enum Refresh {
    Updated(Arc<CalendarView>),
    /// Filters changed while fetching; the result was kept for its own key only.
    Superseded { key: FilterKey },
}

/// What the UI should display right now.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub view: Arc<CalendarView>,
    /// The view belongs to an older applied state (fetch pending or failed).
    pub stale: bool,
}

// ── Facade ────────────────────────────────────────────────────────

/// Drives fetches from the applied filter state and owns the resulting views.
pub struct CalendarFacade {
    source: Arc<dyn CalendarSource>,
    filters: SharedFilters,
    default_window_days: i64,
    today: Option<Date>,
    /// Settled views, each under the key it was fetched for.
    views: DashMap<FilterKey, Arc<CalendarView>>,
    /// Last view published while its key was the applied one.
    latest: RwLock<Option<Arc<CalendarView>>>,
}

impl CalendarFacade {
    pub fn new(source: Arc<dyn CalendarSource>, filters: SharedFilters) -> Self {
        Self {
            source,
            filters,
            default_window_days: 30,
            today: None,
            views: DashMap::new(),
            latest: RwLock::new(None),
        }
    }

    /// Window length used when the applied state has no date range.
    pub fn with_default_window_days(mut self, days: i64) -> Self {
        self.default_window_days = days.clamp(1, MAX_QUERY_WINDOW_DAYS);
        self
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    pub fn filters(&self) -> SharedFilters {
        self.filters.clone()
    }

    fn window_for(&self, state: &FilterState) -> Result<DateSpan, CalendarError> {
        let window = match state.date_range {
            Some(range) => range.to_span(),
            None => {
                let start = self
                    .today
                    .unwrap_or_else(|| chrono::Local::now().date_naive());
                let days = u64::try_from(self.default_window_days).unwrap_or(0);
                let end = start
                    .checked_add_days(chrono::Days::new(days))
                    .filter(|end| *end > start)
                    .ok_or(CalendarError::LimitExceeded("query window out of range"))?;
                DateSpan::new(start, end)
            }
        };
        if window.nights() > MAX_QUERY_WINDOW_DAYS {
            return Err(CalendarError::LimitExceeded("query window too wide"));
        }
        Ok(window)
    }

    /// Fetch for the current applied state and publish the result if that
    /// state is still applied once the fetch settles. On failure the last
    /// published view stays in place.
    pub async fn refresh(&self) -> Result<Refresh, CalendarError> {
        let started = Instant::now();
        let (key, state) = {
            let filters = self.filters.read().await;
            (filters.key(), filters.applied().clone())
        };
        let request_id = Ulid::new();
        debug!(%key, %request_id, "calendar refresh started");

        let result = match self.window_for(&state) {
            Ok(window) => self.load(key.clone(), request_id, &state, window).await,
            Err(e) => Err(e),
        };
        metrics::histogram!(observability::CALENDAR_REFRESH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let view = match result {
            Ok(view) => Arc::new(view),
            Err(e) => {
                warn!(%key, %request_id, "calendar refresh failed, keeping last view: {e}");
                metrics::counter!(observability::CALENDAR_REFRESH_TOTAL, "outcome" => "error")
                    .increment(1);
                return Err(e);
            }
        };

        self.views.insert(key.clone(), view.clone());
        self.evict(&key).await;

        // Held across publish so apply() cannot slip in between check and write.
        let filters = self.filters.read().await;
        if filters.key() != key {
            debug!(%key, %request_id, current = %filters.key(), "discarding superseded result");
            metrics::counter!(observability::CALENDAR_REFRESH_TOTAL, "outcome" => "superseded")
                .increment(1);
            return Ok(Refresh::Superseded { key });
        }
        *self.latest.write().await = Some(view.clone());
        drop(filters);

        metrics::counter!(observability::CALENDAR_REFRESH_TOTAL, "outcome" => "updated").increment(1);
        metrics::gauge!(observability::CONFLICTS_ACTIVE).set(view.conflicts.len() as f64);
        info!(
            %key,
            %request_id,
            properties = view.properties.len(),
            reservations = view.reservations.len(),
            conflicts = view.conflicts.len(),
            "calendar refreshed"
        );
        Ok(Refresh::Updated(view))
    }

    async fn load(
        &self,
        key: FilterKey,
        request_id: Ulid,
        state: &FilterState,
        window: DateSpan,
    ) -> Result<CalendarView, CalendarError> {
        if matches!(state.properties, Selection::None) {
            return Ok(CalendarView::empty(key, request_id, window, state.view));
        }

        let properties: Vec<Property> = self
            .source
            .properties()
            .await
            .map_err(fetch_failed("properties"))?
            .into_iter()
            .filter(|p| state.matches_property(p))
            .collect();
        if properties.is_empty() {
            return Ok(CalendarView::empty(key, request_id, window, state.view));
        }

        let ids: Vec<PropertyId> = properties.iter().map(|p| p.id.clone()).collect();
        let query = ReservationQuery {
            property_ids: ids.clone(),
            window,
        };
        let (reservations, blocks, price_book) = futures::try_join!(
            async {
                self.source
                    .reservations(&query)
                    .await
                    .map_err(fetch_failed("reservations"))
            },
            async { self.source.blocks(&ids).await.map_err(fetch_failed("blocks")) },
            async {
                self.source
                    .price_book(&ids)
                    .await
                    .map_err(fetch_failed("price_book"))
            },
        )?;

        Ok(CalendarView::assemble(
            key,
            request_id,
            state,
            window,
            properties,
            reservations,
            blocks,
            price_book,
        ))
    }

    /// Bound the cache, keeping `fresh` and the published view's key.
    async fn evict(&self, fresh: &FilterKey) {
        if self.views.len() <= MAX_CACHED_VIEWS {
            return;
        }
        let published = self.latest.read().await.as_ref().map(|v| v.key.clone());
        self.views
            .retain(|k, _| k == fresh || published.as_ref() == Some(k));
    }

    /// View for the applied key if settled, otherwise the last published one.
    pub async fn snapshot(&self) -> Option<Snapshot> {
        let key = self.filters.read().await.key();
        if let Some(view) = self.views.get(&key) {
            return Some(Snapshot {
                view: view.value().clone(),
                stale: false,
            });
        }
        self.latest.read().await.clone().map(|view| Snapshot { view, stale: true })
    }

    /// Pre-commit overlap check for a new or edited booking, against fresh
    /// reservations and blocks for that property.
    pub async fn check_availability(
        &self,
        property_id: &str,
        check_in: Date,
        check_out: Date,
        exclude_id: Option<&str>,
    ) -> Result<ConflictCheck, CalendarError> {
        let Some(span) = DateSpan::try_new(check_in, check_out) else {
            return Err(EngineError::InvalidSpan.into());
        };
        let ids = vec![property_id.to_string()];
        let query = ReservationQuery {
            property_ids: ids.clone(),
            window: span,
        };
        let (mut existing, blocks) = futures::try_join!(
            async {
                self.source
                    .reservations(&query)
                    .await
                    .map_err(fetch_failed("reservations"))
            },
            async { self.source.blocks(&ids).await.map_err(fetch_failed("blocks")) },
        )?;
        existing.extend(blocks.into_iter().map(Block::into_reservation));
        Ok(would_conflict(property_id, check_in, check_out, &existing, exclude_id))
    }

    /// Price a prospective stay and surface its minimum-stay constraint.
    pub async fn quote_stay(
        &self,
        property_id: &str,
        span: DateSpan,
        platform: Option<&str>,
    ) -> Result<StayQuote, CalendarError> {
        let property = self
            .source
            .properties()
            .await
            .map_err(fetch_failed("properties"))?
            .into_iter()
            .find(|p| p.id == property_id)
            .ok_or_else(|| CalendarError::UnknownProperty(property_id.to_string()))?;
        let book = self
            .source
            .price_book(std::slice::from_ref(&property.id))
            .await
            .map_err(fetch_failed("price_book"))?;
        Ok(book.quote_stay(&property, &span, platform)?)
    }
}
