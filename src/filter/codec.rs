//! URL query-string codec for [`FilterState`].
//!
//! Every key is optional and absence means "no constraint". List values are
//! comma-joined; the literal [`NONE_SENTINEL`] anywhere in a list means
//! "explicitly zero selected". Invalid fields decode to their default one by
//! one, the rest of the query still loads.

use std::collections::BTreeSet;

use url::form_urlencoded;

use super::{DateRange, FilterState, Selection, View};
use crate::limits::*;
use crate::model::{Date, ReservationStatus};

pub const NONE_SENTINEL: &str = "__NONE__";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical query string (no leading `?`). Keys come out in a fixed order
/// and list items sorted, so equal states always encode identically.
pub fn encode(state: &FilterState) -> String {
    let mut pairs: Vec<String> = Vec::new();

    push_list(&mut pairs, "status", &state.statuses, |s| s.as_str());
    push_list(&mut pairs, "type", &state.types, String::as_str);
    push_list(&mut pairs, "city", &state.cities, String::as_str);
    push_list(&mut pairs, "neighborhood", &state.neighborhoods, String::as_str);
    push_list(&mut pairs, "tags", &state.tags, String::as_str);
    push_list(&mut pairs, "properties", &state.properties, String::as_str);
    if let Some(q) = &state.search {
        pairs.push(format!("q={}", escape(q)));
    }
    if let Some(range) = &state.date_range {
        pairs.push(format!("from={}", range.from.format(DATE_FORMAT)));
        pairs.push(format!("to={}", range.to.format(DATE_FORMAT)));
    }
    if state.view != View::Calendar {
        pairs.push(format!("view={}", state.view.as_str()));
    }

    pairs.join("&")
}

fn push_list<T: Ord>(
    pairs: &mut Vec<String>,
    key: &str,
    sel: &Selection<T>,
    label: impl Fn(&T) -> &str,
) {
    match sel {
        Selection::All => {}
        Selection::None => pairs.push(format!("{key}={NONE_SENTINEL}")),
        Selection::Subset(items) => {
            let joined: Vec<String> = items.iter().map(|i| escape(label(i))).collect();
            pairs.push(format!("{key}={}", joined.join(",")));
        }
    }
}

fn escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Parse a query string (with or without a leading `?`). Never fails.
pub fn decode(query: &str) -> FilterState {
    let query = query.strip_prefix('?').unwrap_or(query);
    if query.len() > MAX_QUERY_STRING_LEN {
        tracing::warn!(len = query.len(), "query string too long, ignoring");
        return FilterState::default();
    }

    let mut state = FilterState::default();
    let mut from: Option<Date> = None;
    let mut to: Option<Date> = None;

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match &*key {
            "status" => state.statuses = decode_statuses(&value),
            "type" => state.types = decode_strings(&value),
            "city" => state.cities = decode_strings(&value),
            "neighborhood" => state.neighborhoods = decode_strings(&value),
            "tags" => state.tags = decode_strings(&value),
            "properties" => state.properties = decode_strings(&value),
            "q" => {
                let q = value.trim();
                state.search =
                    (!q.is_empty() && q.len() <= MAX_SEARCH_LEN).then(|| q.to_string());
            }
            "from" => from = parse_date(&value),
            "to" => to = parse_date(&value),
            "view" => state.view = View::parse(value.trim()).unwrap_or_default(),
            _ => {}
        }
    }

    state.date_range = match (from, to) {
        (Some(from), Some(to)) => {
            DateRange::new(from, to).filter(|r| r.days() <= MAX_QUERY_WINDOW_DAYS)
        }
        _ => None,
    };
    state
}

fn parse_date(value: &str) -> Option<Date> {
    Date::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Split a comma list into trimmed, non-empty items.
fn split_items(value: &str) -> Option<Vec<&str>> {
    let items: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let valid = items.len() <= MAX_SELECTED_ITEMS && items.iter().all(|i| i.len() <= MAX_ITEM_LEN);
    valid.then_some(items)
}

fn decode_strings(value: &str) -> Selection<String> {
    let Some(items) = split_items(value) else {
        return Selection::All;
    };
    if items.contains(&NONE_SENTINEL) {
        return Selection::None;
    }
    Selection::of(items.into_iter().map(String::from))
}

/// An unknown status anywhere drops the whole field to its default.
fn decode_statuses(value: &str) -> Selection<ReservationStatus> {
    let Some(items) = split_items(value) else {
        return Selection::All;
    };
    if items.contains(&NONE_SENTINEL) {
        return Selection::None;
    }
    let parsed: Option<BTreeSet<ReservationStatus>> =
        items.into_iter().map(ReservationStatus::parse).collect();
    match parsed {
        Some(set) => Selection::of(set),
        None => Selection::All,
    }
}
