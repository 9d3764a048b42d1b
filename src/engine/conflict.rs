use std::collections::HashSet;

use serde::Serialize;

use crate::model::*;

use super::occupancy::OccupancyIndex;

/// Two or more occupying reservations on the same property and night.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub property_id: PropertyId,
    pub property_name: String,
    pub date: Date,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoratedReservation {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub has_conflict: bool,
}

/// Outcome of a predictive overlap check for a new or edited booking.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub conflicting_reservation: Option<Reservation>,
}

/// Emit one [`Conflict`] per bucket holding two or more reservations,
/// ordered by property id then date.
pub fn find_conflicts(index: &OccupancyIndex, properties: &[Property]) -> Vec<Conflict> {
    index
        .buckets()
        .filter(|b| b.len() >= 2)
        .map(|b| Conflict {
            property_id: b.property_id.to_string(),
            property_name: property_name(properties, b.property_id),
            date: b.date,
            reservations: b.iter().cloned().collect(),
        })
        .collect()
}

/// Flag every reservation that shares any night with another one.
pub fn decorate_with_conflicts(
    reservations: &[Reservation],
    index: &OccupancyIndex,
) -> Vec<DecoratedReservation> {
    // ids are only unique per origin and property
    let conflicted: HashSet<(Origin, &str, &str)> = index
        .buckets()
        .filter(|b| b.len() >= 2)
        .flat_map(|b| b.iter().map(identity))
        .collect();

    reservations
        .iter()
        .map(|r| DecoratedReservation {
            has_conflict: conflicted.contains(&identity(r)),
            reservation: r.clone(),
        })
        .collect()
}

fn identity(r: &Reservation) -> (Origin, &str, &str) {
    (r.origin, r.property_id.as_str(), r.id.as_str())
}

/// Would a stay on `property_id` over `[check_in, check_out)` collide with
/// an existing occupying reservation? `exclude_id` skips the reservation
/// being edited. Returns the first collision found.
pub fn would_conflict(
    property_id: &str,
    check_in: Date,
    check_out: Date,
    existing: &[Reservation],
    exclude_id: Option<&str>,
) -> ConflictCheck {
    let Some(candidate) = DateSpan::try_new(check_in, check_out) else {
        return ConflictCheck::default();
    };

    existing
        .iter()
        .filter(|r| r.property_id == property_id && r.occupies())
        .filter(|r| exclude_id != Some(r.id.as_str()))
        .find(|r| r.span().is_some_and(|span| span.overlaps(&candidate)))
        .map(|r| ConflictCheck {
            has_conflict: true,
            conflicting_reservation: Some(r.clone()),
        })
        .unwrap_or_default()
}
