use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

use rentcal::calendar::{CalendarError, CalendarFacade, Refresh};
use rentcal::engine::PriceBook;
use rentcal::filter::{FilterEdit, FilterMachine, Selection, SharedFilters};
use rentcal::model::*;
use rentcal::source::{CalendarSource, Dataset, ReservationQuery, SourceError, StaticSource};

const PORTFOLIO: &str = r#"{
    "properties": [
        { "id": "P1", "name": "Copacabana 101", "basePrice": 300, "type": "apartment", "city": "Rio", "neighborhood": "Copacabana", "tags": ["Praia"] },
        { "id": "P2", "name": "Leblon 7", "basePrice": 450, "type": "house", "city": "Rio", "neighborhood": "Leblon", "tags": ["Luxo"] }
    ],
    "reservations": [
        { "id": "A", "propertyId": "P1", "checkIn": "2025-06-10", "checkOut": "2025-06-13", "status": "confirmed", "platform": "airbnb", "guestName": "Ana" },
        { "id": "B", "propertyId": "P1", "checkIn": "2025-06-12", "checkOut": "2025-06-15", "status": "confirmed", "platform": "booking" },
        { "id": "C", "propertyId": "P2", "checkIn": "2025-06-12", "checkOut": "2025-06-14", "status": "checked_out" }
    ],
    "blocks": [
        { "id": "M", "propertyId": "P2", "startDate": "2025-06-20", "endDate": "2025-06-25", "reason": "maintenance" }
    ],
    "pricing": {
        "rules": [
            { "id": "weekday", "propertyId": "P1", "startDate": "2025-01-01", "endDate": "2026-12-31", "daysOfWeek": [1,2,3,4], "basePrice": 280 }
        ],
        "tiers": [
            { "name": "Reveillon", "startDate": "2025-12-28", "endDate": "2026-01-05", "type": "peak", "adjustment": { "mode": "percentage", "value": 100 }, "minNights": 5 }
        ],
        "commissions": [ { "platformId": "airbnb", "commissionPercent": 15 } ]
    }
}"#;

fn d(y: i32, m: u32, day: u32) -> Date {
    Date::from_ymd_opt(y, m, day).unwrap()
}

fn dataset() -> Dataset {
    serde_json::from_str(PORTFOLIO).unwrap()
}

/// Wraps a static source with call counting, failure injection and an
/// optional gate that holds `reservations` until released.
#[derive(Default)]
struct ScriptedSource {
    inner: StaticSource,
    calls: AtomicUsize,
    failing: AtomicBool,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedSource {
    fn new(dataset: Dataset) -> Self {
        Self {
            inner: StaticSource::new(dataset),
            ..Self::default()
        }
    }

    fn gated(dataset: Dataset, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Self::new(dataset)
        }
    }
}

#[async_trait]
impl CalendarSource for ScriptedSource {
    async fn properties(&self) -> Result<Vec<Property>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.properties().await
    }

    async fn reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("503 from reservations".into()));
        }
        self.inner.reservations(query).await
    }

    async fn blocks(&self, property_ids: &[PropertyId]) -> Result<Vec<Block>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.blocks(property_ids).await
    }

    async fn price_book(&self, property_ids: &[PropertyId]) -> Result<PriceBook, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.price_book(property_ids).await
    }
}

fn facade(source: Arc<ScriptedSource>, query: &str) -> (CalendarFacade, SharedFilters) {
    let filters = FilterMachine::from_query(query).shared();
    let facade = CalendarFacade::new(source, filters.clone()).with_today(d(2025, 6, 1));
    (facade, filters)
}

async fn apply(filters: &SharedFilters, edit: FilterEdit) {
    let mut machine = filters.write().await;
    assert_ok!(machine.edit(edit));
    machine.apply();
}

#[tokio::test]
async fn overbooking_surfaces_through_facade() {
    let source = Arc::new(ScriptedSource::new(dataset()));
    let (facade, _) = facade(source, "from=2025-06-01&to=2025-06-30");

    let Refresh::Updated(view) = assert_ok!(facade.refresh().await) else {
        panic!("expected a published view");
    };
    assert_eq!(view.conflicts.len(), 1);
    let conflict = &view.conflicts[0];
    assert_eq!(conflict.property_name, "Copacabana 101");
    assert_eq!(conflict.date, d(2025, 6, 12));

    let flagged: Vec<_> = view
        .reservations
        .iter()
        .filter(|r| r.has_conflict)
        .map(|r| r.reservation.id.as_str())
        .collect();
    assert_eq!(flagged, vec!["A", "B"]);

    let p2 = view.occupancy.iter().find(|o| o.property_id == "P2").unwrap();
    assert_eq!(p2.nights_booked, 5);

    let json = serde_json::to_value(view.as_ref()).unwrap();
    assert_eq!(json["conflicts"][0]["propertyId"], "P1");
    assert_eq!(json["reservations"][0]["hasConflict"], true);
}

#[tokio::test]
async fn superseded_fetch_does_not_overwrite_display() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(ScriptedSource::gated(dataset(), entered.clone(), release.clone()));
    let (facade, filters) = facade(source, "from=2025-06-01&to=2025-06-30");
    let facade = Arc::new(facade);

    let slow = tokio::spawn({
        let facade = facade.clone();
        async move { facade.refresh().await }
    });
    entered.notified().await;

    apply(&filters, FilterEdit::Neighborhoods(Selection::of(["Leblon".to_string()]))).await;
    release.notify_one();

    let outcome = assert_ok!(slow.await.unwrap());
    assert!(matches!(outcome, Refresh::Superseded { .. }));
    assert!(facade.snapshot().await.is_none());

    release.notify_one();
    let Refresh::Updated(view) = assert_ok!(facade.refresh().await) else {
        panic!("expected a published view");
    };
    assert_eq!(view.properties.len(), 1);
    assert_eq!(view.properties[0].id, "P2");

    let snap = facade.snapshot().await.unwrap();
    assert!(!snap.stale);
    assert_eq!(snap.view.key, view.key);
}

#[tokio::test]
async fn failed_fetch_keeps_last_good_view() {
    let source = Arc::new(ScriptedSource::new(dataset()));
    let (facade, filters) = facade(source.clone(), "from=2025-06-01&to=2025-06-30");

    let Refresh::Updated(good) = assert_ok!(facade.refresh().await) else {
        panic!("expected a published view");
    };

    source.failing.store(true, Ordering::SeqCst);
    apply(&filters, FilterEdit::Tags(Selection::of(["Praia".to_string()]))).await;

    let err = assert_err!(facade.refresh().await);
    assert!(matches!(err, CalendarError::Fetch { resource: "reservations", .. }));
    assert!(err.to_string().contains("503"));

    let snap = facade.snapshot().await.unwrap();
    assert!(snap.stale);
    assert_eq!(snap.view.key, good.key);
    assert_eq!(snap.view.conflicts.len(), 1);
}

#[tokio::test]
async fn explicit_empty_selection_skips_fetch() {
    let source = Arc::new(ScriptedSource::new(dataset()));
    let (facade, _) = facade(source.clone(), "properties=__NONE__");

    let Refresh::Updated(view) = assert_ok!(facade.refresh().await) else {
        panic!("expected a published view");
    };
    assert!(view.properties.is_empty());
    assert!(view.reservations.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hidden_statuses_still_count_for_conflicts() {
    let source = Arc::new(ScriptedSource::new(dataset()));
    let (facade, _) = facade(source, "status=checked_out&from=2025-06-01&to=2025-06-30");

    let Refresh::Updated(view) = assert_ok!(facade.refresh().await) else {
        panic!("expected a published view");
    };
    let shown: Vec<_> = view.reservations.iter().map(|r| r.reservation.id.as_str()).collect();
    assert_eq!(shown, vec!["C", "M"]);
    assert_eq!(view.conflicts.len(), 1);
}

#[tokio::test]
async fn booking_wizard_checks() {
    let source = Arc::new(ScriptedSource::new(dataset()));
    let (facade, _) = facade(source, "");

    let clash = assert_ok!(facade.check_availability("P1", d(2025, 6, 14), d(2025, 6, 16), None).await);
    assert!(clash.has_conflict);
    assert_eq!(clash.conflicting_reservation.unwrap().id, "B");

    let turnover = assert_ok!(facade.check_availability("P1", d(2025, 6, 15), d(2025, 6, 18), None).await);
    assert!(!turnover.has_conflict);

    let blocked = assert_ok!(facade.check_availability("P2", d(2025, 6, 24), d(2025, 6, 26), None).await);
    assert!(blocked.has_conflict);

    let reveillon = DateSpan::new(d(2025, 12, 29), d(2026, 1, 1));
    let quote = assert_ok!(facade.quote_stay("P1", reveillon, Some("airbnb")).await);
    assert_eq!(quote.min_nights, Some(5));
    assert_eq!(quote.nights[1].price, 644.0);
    assert_err!(quote.enforce_min_stay());
}
