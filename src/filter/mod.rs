mod codec;

pub use codec::{NONE_SENTINEL, decode, encode};

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::limits::*;
use crate::model::*;

/// Handle shared between the composition root and the calendar facade.
pub type SharedFilters = Arc<RwLock<FilterMachine>>;

// ── Value types ───────────────────────────────────────────────────

/// Three distinct cases for a list filter: no constraint, explicitly
/// nothing, or a concrete set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum Selection<T: Ord> {
    All,
    None,
    Subset(BTreeSet<T>),
}

impl<T: Ord> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: Ord> Selection<T> {
    /// An empty collection means "no filter".
    pub fn of(items: impl IntoIterator<Item = T>) -> Self {
        let set: BTreeSet<T> = items.into_iter().collect();
        if set.is_empty() {
            Selection::All
        } else {
            Selection::Subset(set)
        }
    }

    pub fn allows(&self, item: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::None => false,
            Selection::Subset(set) => set.contains(item),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    fn normalized(self) -> Self {
        match self {
            Selection::Subset(set) if set.is_empty() => Selection::All,
            other => other,
        }
    }
}

/// Visible window, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Date,
    pub to: Date,
}

impl DateRange {
    pub fn new(from: Date, to: Date) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// Night span covering every displayed day.
    pub fn to_span(&self) -> DateSpan {
        DateSpan::new(self.from, self.to + chrono::Days::new(1))
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Calendar,
    List,
    Timeline,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Calendar => "calendar",
            View::List => "list",
            View::Timeline => "timeline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(View::Calendar),
            "list" => Some(View::List),
            "timeline" => Some(View::Timeline),
            _ => None,
        }
    }
}

/// One snapshot of every filter dimension. Held twice by [`FilterMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub properties: Selection<PropertyId>,
    pub statuses: Selection<ReservationStatus>,
    pub types: Selection<String>,
    pub cities: Selection<String>,
    pub neighborhoods: Selection<String>,
    pub tags: Selection<String>,
    pub search: Option<String>,
    pub date_range: Option<DateRange>,
    pub view: View,
}

impl FilterState {
    /// Property-side dimensions: id, type, city, neighborhood, tags (any), search.
    pub fn matches_property(&self, p: &Property) -> bool {
        fn opt_allows(sel: &Selection<String>, value: &Option<String>) -> bool {
            match (sel, value) {
                (Selection::All, _) => true,
                (_, Some(v)) => sel.allows(v),
                (_, None) => false,
            }
        }

        let tags_ok = match &self.tags {
            Selection::All => true,
            Selection::None => false,
            Selection::Subset(set) => p.tags.iter().any(|t| set.contains(t)),
        };
        let search_ok = self.search.as_deref().is_none_or(|q| {
            let q = q.to_lowercase();
            [Some(&p.name), p.city.as_ref(), p.neighborhood.as_ref()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&q))
        });

        self.properties.allows(&p.id)
            && opt_allows(&self.types, &p.kind)
            && opt_allows(&self.cities, &p.city)
            && opt_allows(&self.neighborhoods, &p.neighborhood)
            && tags_ok
            && search_ok
    }

    /// Status filter narrows bookings only; blocks are always listed.
    pub fn shows_reservation(&self, r: &Reservation) -> bool {
        match r.origin {
            Origin::Block => true,
            Origin::Booking => self.statuses.allows(&r.status),
        }
    }
}

/// Stable fetch key derived from an applied state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterKey(String);

impl FilterKey {
    pub fn of(state: &FilterState) -> Self {
        Self(encode(state))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FilterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("<all>")
        } else {
            f.write_str(&self.0)
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    ReservedValue(&'static str),
    InvalidValue { field: &'static str, reason: String },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::ReservedValue(field) => {
                write!(f, "{field}: {NONE_SENTINEL} is reserved")
            }
            FilterError::InvalidValue { field, reason } => write!(f, "{field}: {reason}"),
            FilterError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for FilterError {}

// ── State machine ─────────────────────────────────────────────────

/// A single draft mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEdit {
    Properties(Selection<PropertyId>),
    Statuses(Selection<ReservationStatus>),
    Types(Selection<String>),
    Cities(Selection<String>),
    Neighborhoods(Selection<String>),
    Tags(Selection<String>),
    Search(Option<String>),
    DateRange(Option<DateRange>),
    View(View),
}

/// Draft/applied pair. `applied` and its query string change together.
#[derive(Debug, Clone, Default)]
pub struct FilterMachine {
    applied: FilterState,
    draft: FilterState,
    query: String,
}

impl FilterMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedFilters {
        Arc::new(RwLock::new(self))
    }

    /// Build from a URL query string (shareable links).
    pub fn from_query(query: &str) -> Self {
        let mut machine = Self::new();
        machine.load_from_url(query);
        machine
    }

    pub fn applied(&self) -> &FilterState {
        &self.applied
    }

    pub fn draft(&self) -> &FilterState {
        &self.draft
    }

    /// Query string mirroring `applied`, without the leading `?`.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn key(&self) -> FilterKey {
        FilterKey(self.query.clone())
    }

    /// Draft differs from applied in any dimension (set-wise).
    pub fn has_pending_changes(&self) -> bool {
        self.draft != self.applied
    }

    /// Mutate the draft only. Rejected edits leave it untouched.
    pub fn edit(&mut self, edit: FilterEdit) -> Result<(), FilterError> {
        match edit {
            FilterEdit::Properties(sel) => self.draft.properties = normalize_items("properties", sel)?,
            FilterEdit::Statuses(sel) => self.draft.statuses = sel.normalized(),
            FilterEdit::Types(sel) => self.draft.types = normalize_items("type", sel)?,
            FilterEdit::Cities(sel) => self.draft.cities = normalize_items("city", sel)?,
            FilterEdit::Neighborhoods(sel) => {
                self.draft.neighborhoods = normalize_items("neighborhood", sel)?
            }
            FilterEdit::Tags(sel) => self.draft.tags = normalize_items("tags", sel)?,
            FilterEdit::Search(q) => self.draft.search = normalize_search(q)?,
            FilterEdit::DateRange(range) => {
                if let Some(r) = range
                    && r.from > r.to
                {
                    return Err(FilterError::InvalidValue {
                        field: "date_range",
                        reason: format!("{} is after {}", r.from, r.to),
                    });
                }
                if range.is_some_and(|r| r.days() > MAX_QUERY_WINDOW_DAYS) {
                    return Err(FilterError::LimitExceeded("date range too wide"));
                }
                self.draft.date_range = range;
            }
            FilterEdit::View(view) => self.draft.view = view,
        }
        Ok(())
    }

    /// Drop uncommitted draft edits.
    pub fn discard_draft(&mut self) {
        self.draft = self.applied.clone();
    }

    /// Commit draft → applied and rewrite the query string in one step.
    /// Returns the key the caller should refetch with.
    pub fn apply(&mut self) -> FilterKey {
        self.applied = self.draft.clone();
        self.query = encode(&self.applied);
        metrics::counter!(crate::observability::FILTER_APPLY_TOTAL).increment(1);
        debug!(query = %self.query, "filters applied");
        self.key()
    }

    /// Back to the all-inclusive default; clears the query string.
    pub fn reset(&mut self) -> FilterKey {
        self.applied = FilterState::default();
        self.draft = FilterState::default();
        self.query.clear();
        debug!("filters reset");
        self.key()
    }

    /// Parse `query` into applied and mirror it into draft. Invalid fields
    /// fall back to their defaults individually.
    pub fn load_from_url(&mut self, query: &str) -> FilterKey {
        self.applied = decode(query);
        self.draft = self.applied.clone();
        self.query = encode(&self.applied);
        debug!(query = %self.query, "filters loaded from url");
        self.key()
    }
}

fn normalize_items(
    field: &'static str,
    sel: Selection<String>,
) -> Result<Selection<String>, FilterError> {
    let Selection::Subset(items) = sel else {
        return Ok(sel);
    };
    if items.len() > MAX_SELECTED_ITEMS {
        return Err(FilterError::LimitExceeded("too many selected items"));
    }
    let mut out = BTreeSet::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if item == NONE_SENTINEL {
            return Err(FilterError::ReservedValue(field));
        }
        if item.contains(',') {
            return Err(FilterError::InvalidValue {
                field,
                reason: format!("'{item}' contains a comma"),
            });
        }
        if item.len() > MAX_ITEM_LEN {
            return Err(FilterError::LimitExceeded("filter item too long"));
        }
        out.insert(item.to_string());
    }
    Ok(Selection::Subset(out).normalized())
}

fn normalize_search(q: Option<String>) -> Result<Option<String>, FilterError> {
    let Some(q) = q else { return Ok(None) };
    let q = q.trim();
    if q.len() > MAX_SEARCH_LEN {
        return Err(FilterError::LimitExceeded("search text too long"));
    }
    Ok((!q.is_empty()).then(|| q.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> Date {
        Date::from_ymd_opt(2025, m, day).unwrap()
    }

    fn strings(items: &[&str]) -> Selection<String> {
        Selection::of(items.iter().map(|s| s.to_string()))
    }

    fn property(id: &str, city: &str, tags: &[&str]) -> Property {
        Property {
            id: id.into(),
            name: format!("Flat {id}"),
            base_price: 100.0,
            kind: Some("apartment".into()),
            city: Some(city.into()),
            neighborhood: Some("Ipanema".into()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn selection_cases_are_distinct() {
        let all: Selection<String> = Selection::All;
        let none: Selection<String> = Selection::None;
        let empty = strings(&[]);
        assert!(all.allows(&"x".to_string()));
        assert!(!none.allows(&"x".to_string()));
        assert_eq!(empty, Selection::All);
        assert_ne!(none, Selection::All);
    }

    #[test]
    fn edit_touches_only_draft() {
        let mut m = FilterMachine::new();
        m.edit(FilterEdit::Cities(strings(&["Rio"]))).unwrap();
        assert!(m.applied().cities.is_all());
        assert_eq!(m.draft().cities, strings(&["Rio"]));
        assert!(m.has_pending_changes());
        assert_eq!(m.query(), "");
    }

    #[test]
    fn apply_converges_draft_and_applied() {
        let mut m = FilterMachine::new();
        m.edit(FilterEdit::Tags(strings(&["Praia", "Luxo"]))).unwrap();
        m.edit(FilterEdit::Properties(Selection::None)).unwrap();
        let key = m.apply();
        assert!(!m.has_pending_changes());
        assert_eq!(m.applied(), m.draft());
        assert_eq!(key, m.key());
        assert_eq!(encode(m.draft()), m.query());
    }

    #[test]
    fn pending_changes_is_order_independent() {
        let mut m = FilterMachine::new();
        m.edit(FilterEdit::Tags(strings(&["b", "a"]))).unwrap();
        m.apply();
        m.edit(FilterEdit::Tags(strings(&["a", "b"]))).unwrap();
        assert!(!m.has_pending_changes());
        m.edit(FilterEdit::Tags(strings(&["a"]))).unwrap();
        assert!(m.has_pending_changes());
    }

    #[test]
    fn reset_clears_everything() {
        let mut m = FilterMachine::from_query("city=Rio&view=list");
        m.edit(FilterEdit::Search(Some("loft".into()))).unwrap();
        m.reset();
        assert_eq!(m.applied(), &FilterState::default());
        assert!(!m.has_pending_changes());
        assert_eq!(m.query(), "");
    }

    #[test]
    fn load_mirrors_into_draft() {
        let m = FilterMachine::from_query("?status=confirmed,pending&properties=p1,p2");
        assert_eq!(m.applied(), m.draft());
        assert!(!m.has_pending_changes());
        assert_eq!(
            m.applied().statuses,
            Selection::of([ReservationStatus::Confirmed, ReservationStatus::Pending])
        );
    }

    #[test]
    fn discard_draft_restores_applied() {
        let mut m = FilterMachine::from_query("view=timeline");
        m.edit(FilterEdit::View(View::List)).unwrap();
        m.discard_draft();
        assert!(!m.has_pending_changes());
        assert_eq!(m.draft().view, View::Timeline);
    }

    #[test]
    fn edits_are_trimmed_and_validated() {
        let mut m = FilterMachine::new();
        m.edit(FilterEdit::Cities(strings(&[" Rio ", "  "]))).unwrap();
        assert_eq!(m.draft().cities, strings(&["Rio"]));

        assert_eq!(
            m.edit(FilterEdit::Tags(strings(&[NONE_SENTINEL]))),
            Err(FilterError::ReservedValue("tags"))
        );
        assert!(matches!(
            m.edit(FilterEdit::Tags(strings(&["a,b"]))),
            Err(FilterError::InvalidValue { field: "tags", .. })
        ));
        let long = "x".repeat(MAX_ITEM_LEN + 1);
        assert!(matches!(
            m.edit(FilterEdit::Tags(strings(&[long.as_str()]))),
            Err(FilterError::LimitExceeded(_))
        ));
        assert!(m.draft().tags.is_all());
    }

    #[test]
    fn inverted_date_range_rejected() {
        let mut m = FilterMachine::new();
        let bad = DateRange { from: d(6, 10), to: d(6, 1) };
        assert!(m.edit(FilterEdit::DateRange(Some(bad))).is_err());
        assert_eq!(m.draft().date_range, None);
    }

    #[test]
    fn overlong_date_range_rejected() {
        let mut m = FilterMachine::new();
        let year = DateRange::new(d(1, 1), Date::from_ymd_opt(2026, 1, 1).unwrap());
        m.edit(FilterEdit::DateRange(year)).unwrap();
        let wide = DateRange::new(d(1, 1), Date::from_ymd_opt(2026, 6, 30).unwrap());
        assert_eq!(
            m.edit(FilterEdit::DateRange(wide)),
            Err(FilterError::LimitExceeded("date range too wide"))
        );
        assert_eq!(m.draft().date_range, year);
    }

    #[test]
    fn every_single_edit_marks_pending() {
        let edits = vec![
            FilterEdit::Properties(strings(&["p1"])),
            FilterEdit::Properties(Selection::None),
            FilterEdit::Statuses(Selection::of([ReservationStatus::Confirmed])),
            FilterEdit::Statuses(Selection::None),
            FilterEdit::Types(strings(&["house"])),
            FilterEdit::Cities(strings(&["Rio"])),
            FilterEdit::Neighborhoods(strings(&["Leblon"])),
            FilterEdit::Neighborhoods(Selection::None),
            FilterEdit::Tags(strings(&["Praia"])),
            FilterEdit::Search(Some("loft".into())),
            FilterEdit::DateRange(DateRange::new(d(6, 1), d(6, 30))),
            FilterEdit::View(View::Timeline),
        ];
        for edit in edits {
            let mut m = FilterMachine::new();
            m.apply();
            assert!(!m.has_pending_changes());
            m.edit(edit.clone()).unwrap();
            assert!(m.has_pending_changes(), "{edit:?}");
            m.apply();
            assert!(!m.has_pending_changes(), "{edit:?}");
        }
    }

    #[test]
    fn blank_search_means_no_search() {
        let mut m = FilterMachine::new();
        m.edit(FilterEdit::Search(Some("   ".into()))).unwrap();
        assert_eq!(m.draft().search, None);
        assert!(!m.has_pending_changes());
    }

    #[test]
    fn date_range_span_includes_last_day() {
        let r = DateRange::new(d(6, 1), d(6, 30)).unwrap();
        assert_eq!(r.days(), 30);
        assert_eq!(r.to_span().nights(), 30);
        assert!(r.to_span().contains(d(6, 30)));
    }

    #[test]
    fn property_matching() {
        let mut state = FilterState {
            cities: strings(&["Rio"]),
            tags: strings(&["Praia"]),
            ..FilterState::default()
        };
        assert!(state.matches_property(&property("p1", "Rio", &["Praia", "Luxo"])));
        assert!(!state.matches_property(&property("p2", "Niteroi", &["Praia"])));
        assert!(!state.matches_property(&property("p3", "Rio", &["Centro"])));

        state.search = Some("flat P1".into());
        assert!(state.matches_property(&property("p1", "Rio", &["Praia"])));
        state.search = Some("zzz".into());
        assert!(!state.matches_property(&property("p1", "Rio", &["Praia"])));

        let none = FilterState {
            properties: Selection::None,
            ..FilterState::default()
        };
        assert!(!none.matches_property(&property("p1", "Rio", &[])));
    }

    #[test]
    fn status_filter_spares_blocks() {
        let state = FilterState {
            statuses: Selection::of([ReservationStatus::Confirmed]),
            ..FilterState::default()
        };
        let block = Block {
            id: "b".into(),
            property_id: "p1".into(),
            start_date: d(6, 1),
            end_date: d(6, 2),
            reason: None,
        }
        .into_reservation();
        assert!(state.shows_reservation(&block));
        let mut pending = block.clone();
        pending.origin = Origin::Booking;
        pending.status = ReservationStatus::Pending;
        assert!(!state.shows_reservation(&pending));
    }
}
