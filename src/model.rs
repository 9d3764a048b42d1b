use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calendar dates are the only time type; time-of-day never matters.
pub type Date = NaiveDate;

pub type PropertyId = String;
pub type ReservationId = String;

/// Half-open night span `[start, end)`: `start` is the first occupied night,
/// `end` is the checkout day and stays free for the next arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: Date,
    pub end: Date,
}

impl DateSpan {
    pub fn new(start: Date, end: Date) -> Self {
        debug_assert!(start < end, "DateSpan start must be before end");
        Self { start, end }
    }

    /// `None` when `end <= start`, i.e. the span holds no night at all.
    pub fn try_new(start: Date, end: Date) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date < self.end
    }

    /// Intersection of two spans, `None` when they share no night.
    pub fn clamp_to(&self, window: &DateSpan) -> Option<DateSpan> {
        DateSpan::try_new(self.start.max(window.start), self.end.min(window.end))
    }

    /// Every occupied night, check-in inclusive, checkout exclusive.
    pub fn dates(&self) -> impl Iterator<Item = Date> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
    Blocked,
    Maintenance,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 8] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::CheckedIn,
        ReservationStatus::CheckedOut,
        ReservationStatus::Cancelled,
        ReservationStatus::NoShow,
        ReservationStatus::Blocked,
        ReservationStatus::Maintenance,
    ];

    /// Statuses that hold a night on a reservation record.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::CheckedIn
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::CheckedIn => "checked_in",
            ReservationStatus::CheckedOut => "checked_out",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::NoShow => "no_show",
            ReservationStatus::Blocked => "blocked",
            ReservationStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fetch a record came from. Blocks always occupy their nights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Booking,
    Block,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    #[serde(default)]
    pub property_id: PropertyId,
    pub check_in: Date,
    pub check_out: Date,
    pub status: ReservationStatus,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub origin: Origin,
}

impl Reservation {
    /// Occupied span, `None` for degenerate records (`checkOut <= checkIn`).
    pub fn span(&self) -> Option<DateSpan> {
        DateSpan::try_new(self.check_in, self.check_out)
    }

    pub fn nights(&self) -> i64 {
        self.span().map_or(0, |s| s.nights())
    }

    /// Whether this record holds its nights for occupancy and conflicts.
    pub fn occupies(&self) -> bool {
        if self.property_id.is_empty() {
            return false;
        }
        match self.origin {
            Origin::Block => true,
            Origin::Booking => self.status.is_active(),
        }
    }
}

/// Owner/maintenance block as returned by the block fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub property_id: PropertyId,
    pub start_date: Date,
    pub end_date: Date,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Block {
    /// Blocks enter the occupancy index as reservation-shaped records.
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            property_id: self.property_id,
            check_in: self.start_date,
            check_out: self.end_date,
            status: ReservationStatus::Blocked,
            platform: None,
            guest_name: self.reason,
            pricing: Pricing::default(),
            origin: Origin::Block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub base_price: f64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Display name for a property id, falling back to a placeholder.
pub fn property_name(properties: &[Property], id: &str) -> String {
    properties
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("Property {id}"))
}
