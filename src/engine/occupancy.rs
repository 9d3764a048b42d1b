use std::collections::BTreeMap;

use crate::model::*;

/// Per-property, per-night index of occupying reservations.
///
/// A night `d` is keyed for reservation `r` iff `r.check_in <= d < r.check_out`.
/// Buckets keep insertion order so display tie-breaks are stable. The index is
/// rebuilt wholesale from a snapshot and never patched in place.
#[derive(Debug, Clone, Default)]
pub struct OccupancyIndex {
    /// Only records that occupy, in input order.
    reservations: Vec<Reservation>,
    /// property → night → positions into `reservations`.
    by_property: BTreeMap<PropertyId, BTreeMap<Date, Vec<usize>>>,
}

/// One (property, night) bucket.
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'a> {
    pub property_id: &'a str,
    pub date: Date,
    slots: &'a [usize],
    all: &'a [Reservation],
}

impl<'a> Bucket<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Reservation> + use<'a> {
        let all = self.all;
        self.slots.iter().map(move |&i| &all[i])
    }
}

impl OccupancyIndex {
    /// Index every occupied night of every occupying reservation.
    /// Degenerate spans and records without a property contribute nothing.
    pub fn build(reservations: &[Reservation]) -> Self {
        Self::build_inner(reservations, None)
    }

    /// Same as [`build`](Self::build) but only nights inside `window` are keyed.
    pub fn build_within(reservations: &[Reservation], window: &DateSpan) -> Self {
        Self::build_inner(reservations, Some(window))
    }

    fn build_inner(reservations: &[Reservation], window: Option<&DateSpan>) -> Self {
        let mut index = Self::default();
        for r in reservations {
            if !r.occupies() {
                continue;
            }
            let Some(mut span) = r.span() else { continue };
            if let Some(w) = window {
                match span.clamp_to(w) {
                    Some(clamped) => span = clamped,
                    None => continue,
                }
            }

            let pos = index.reservations.len();
            index.reservations.push(r.clone());
            let nights = index.by_property.entry(r.property_id.clone()).or_default();
            for date in span.dates() {
                nights.entry(date).or_default().push(pos);
            }
        }
        index
    }

    /// Reservations that made it into the index.
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn is_empty(&self) -> bool {
        self.by_property.is_empty()
    }

    pub fn property_ids(&self) -> impl Iterator<Item = &str> {
        self.by_property.keys().map(String::as_str)
    }

    /// Reservations holding `property` on night `date`, in insertion order.
    pub fn occupants(&self, property_id: &str, date: Date) -> impl Iterator<Item = &Reservation> {
        self.by_property
            .get(property_id)
            .and_then(|nights| nights.get(&date))
            .map(|slots| slots.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&i| &self.reservations[i])
    }

    /// All non-empty buckets, ordered by property id then date.
    pub fn buckets(&self) -> impl Iterator<Item = Bucket<'_>> {
        self.by_property.iter().flat_map(move |(pid, nights)| {
            nights.iter().map(move |(date, slots)| Bucket {
                property_id: pid.as_str(),
                date: *date,
                slots: slots.as_slice(),
                all: &self.reservations,
            })
        })
    }

    /// True when no night of `span` is held on `property`.
    pub fn is_free(&self, property_id: &str, span: &DateSpan) -> bool {
        let Some(nights) = self.by_property.get(property_id) else {
            return true;
        };
        if span.start >= span.end {
            return true;
        }
        nights.range(span.start..span.end).next().is_none()
    }

    /// Nights keyed for a reservation id, ascending.
    pub fn dates_for(&self, reservation_id: &str) -> Vec<Date> {
        let Some(pos) = self.reservations.iter().position(|r| r.id == reservation_id) else {
            return Vec::new();
        };
        let property = &self.reservations[pos].property_id;
        self.by_property
            .get(property)
            .map(|nights| {
                nights
                    .iter()
                    .filter(|(_, slots)| slots.contains(&pos))
                    .map(|(date, _)| *date)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Count of nights in `window` with at least one occupant.
    pub fn nights_booked(&self, property_id: &str, window: &DateSpan) -> usize {
        if window.start >= window.end {
            return 0;
        }
        self.by_property
            .get(property_id)
            .map_or(0, |nights| nights.range(window.start..window.end).count())
    }

    /// Fraction of `window` nights that are held, in `[0, 1]`.
    pub fn occupancy_rate(&self, property_id: &str, window: &DateSpan) -> f64 {
        let total = window.nights();
        if total <= 0 {
            return 0.0;
        }
        self.nights_booked(property_id, window) as f64 / total as f64
    }
}
