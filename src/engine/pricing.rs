use std::collections::BTreeSet;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::limits::MAX_QUOTE_NIGHTS;
use crate::model::*;

use super::EngineError;

// ── Rule types ────────────────────────────────────────────────────

/// Nightly base price for every date in `[start_date, end_date]` (inclusive)
/// whose weekday is in `days_of_week` (0 = Sunday .. 6 = Saturday).
/// An empty weekday set matches every day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRule {
    pub id: String,
    pub property_id: PropertyId,
    pub start_date: Date,
    pub end_date: Date,
    #[serde(default)]
    pub days_of_week: BTreeSet<u8>,
    pub base_price: f64,
}

impl PriceRule {
    pub fn matches(&self, property_id: &str, date: Date) -> bool {
        self.property_id == property_id
            && self.start_date <= date
            && date <= self.end_date
            && (self.days_of_week.is_empty()
                || self.days_of_week.contains(&(date.weekday().num_days_from_sunday() as u8)))
    }

    fn width_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierType {
    Low,
    High,
    Peak,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum Adjustment {
    /// Multiplies the running price by `1 + value / 100`.
    Percentage(f64),
    /// Replaces the running price.
    Fixed(f64),
}

impl Adjustment {
    pub fn apply(self, price: f64) -> f64 {
        match self {
            Adjustment::Percentage(pct) => price * (1.0 + pct / 100.0),
            Adjustment::Fixed(value) => value,
        }
    }
}

/// Named seasonal period over `[start_date, end_date]` (inclusive).
/// `property_id = None` applies to every property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalTier {
    pub name: String,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
    pub start_date: Date,
    pub end_date: Date,
    #[serde(rename = "type")]
    pub tier_type: TierType,
    pub adjustment: Adjustment,
    #[serde(default)]
    pub min_nights: Option<u32>,
}

impl SeasonalTier {
    pub fn matches(&self, property_id: &str, date: Date) -> bool {
        self.property_id.as_deref().is_none_or(|p| p == property_id)
            && self.start_date <= date
            && date <= self.end_date
    }

    fn shares_scope(&self, other: &SeasonalTier) -> bool {
        match (&self.property_id, &other.property_id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCommission {
    pub platform_id: String,
    pub commission_percent: f64,
}

// ── Result types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseSource {
    Rule { rule_id: String },
    PropertyBase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalStage {
    pub tier: String,
    pub tier_type: TierType,
    pub adjustment: Adjustment,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionStage {
    pub platform_id: String,
    pub commission_percent: f64,
    pub price: f64,
}

/// Each stage's value, rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub base: f64,
    pub base_source: BaseSource,
    pub seasonal: Option<SeasonalStage>,
    pub commission: Option<CommissionStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub property_id: PropertyId,
    pub date: Date,
    pub final_price: f64,
    /// Minimum stay imposed by the seasonal tier that priced this date.
    pub min_nights: Option<u32>,
    pub breakdown: PriceBreakdown,
}

/// Round half away from zero to two decimal places.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ── Resolution ────────────────────────────────────────────────────

/// Resolve the payable nightly price for `property_id` on `date`.
///
/// 1. Base: the narrowest matching [`PriceRule`] (later definitions win ties),
///    else `base_price`.
/// 2. Seasonal: the last-defined matching [`SeasonalTier`] adjusts the running price.
/// 3. Commission: multiplies by `1 + commission_percent / 100`.
/// 4. Rounds the result to the currency's minor unit.
pub fn resolve_price(
    base_price: f64,
    property_id: &str,
    date: Date,
    rules: &[PriceRule],
    tiers: &[SeasonalTier],
    commission: Option<&PlatformCommission>,
) -> PriceQuote {
    let rule = rules
        .iter()
        .filter(|r| r.matches(property_id, date))
        .fold(None::<&PriceRule>, |best, r| match best {
            Some(b) if b.width_days() < r.width_days() => Some(b),
            _ => Some(r),
        });

    let (mut price, base_source) = match rule {
        Some(r) => (
            r.base_price,
            BaseSource::Rule {
                rule_id: r.id.clone(),
            },
        ),
        None => (base_price, BaseSource::PropertyBase),
    };
    let base = round_money(price);

    let tier = tiers.iter().rev().find(|t| t.matches(property_id, date));
    let seasonal = tier.map(|t| {
        price = t.adjustment.apply(price);
        SeasonalStage {
            tier: t.name.clone(),
            tier_type: t.tier_type,
            adjustment: t.adjustment,
            price: round_money(price),
        }
    });

    let commission = commission.map(|c| {
        price *= 1.0 + c.commission_percent / 100.0;
        CommissionStage {
            platform_id: c.platform_id.clone(),
            commission_percent: c.commission_percent,
            price: round_money(price),
        }
    });

    PriceQuote {
        property_id: property_id.to_string(),
        date,
        final_price: round_money(price),
        min_nights: tier.and_then(|t| t.min_nights),
        breakdown: PriceBreakdown {
            base,
            base_source,
            seasonal,
            commission,
        },
    }
}

/// Pairs of tiers with a shared scope whose date spans intersect.
/// Resolution still uses last-defined-wins; this only surfaces the ambiguity.
pub fn find_overlapping_tiers(tiers: &[SeasonalTier]) -> Result<(), EngineError> {
    let mut pairs = Vec::new();
    for (i, a) in tiers.iter().enumerate() {
        for b in &tiers[i + 1..] {
            if a.shares_scope(b) && a.start_date <= b.end_date && b.start_date <= a.end_date {
                pairs.push((a.name.clone(), b.name.clone()));
            }
        }
    }
    if pairs.is_empty() {
        Ok(())
    } else {
        Err(EngineError::OverlappingTiers(pairs))
    }
}

// ── Price book ────────────────────────────────────────────────────

/// Active rule set for a group of properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBook {
    #[serde(default)]
    pub rules: Vec<PriceRule>,
    #[serde(default)]
    pub tiers: Vec<SeasonalTier>,
    #[serde(default)]
    pub commissions: Vec<PlatformCommission>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NightlyPrice {
    pub date: Date,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StayQuote {
    pub property_id: PropertyId,
    pub span: DateSpan,
    pub nights: Vec<NightlyPrice>,
    pub total: f64,
    /// Strongest minimum stay among the tiers touching the stay.
    pub min_nights: Option<u32>,
}

impl StayQuote {
    /// Reject a stay shorter than the surfaced minimum.
    pub fn enforce_min_stay(&self) -> Result<(), EngineError> {
        let requested = self.span.nights();
        match self.min_nights {
            Some(required) if requested < i64::from(required) => {
                Err(EngineError::MinStayNotMet {
                    required,
                    requested,
                })
            }
            _ => Ok(()),
        }
    }
}

impl PriceBook {
    /// Commission for a platform id; unknown platforms carry none.
    pub fn commission(&self, platform: &str) -> Option<&PlatformCommission> {
        self.commissions.iter().find(|c| c.platform_id == platform)
    }

    /// Only the rules and tiers that can touch `property_id`.
    pub fn for_property(&self, property_id: &str) -> PriceBook {
        PriceBook {
            rules: self
                .rules
                .iter()
                .filter(|r| r.property_id == property_id)
                .cloned()
                .collect(),
            tiers: self
                .tiers
                .iter()
                .filter(|t| t.property_id.as_deref().is_none_or(|p| p == property_id))
                .cloned()
                .collect(),
            commissions: self.commissions.clone(),
        }
    }

    pub fn quote(&self, property: &Property, date: Date, platform: Option<&str>) -> PriceQuote {
        resolve_price(
            property.base_price,
            &property.id,
            date,
            &self.rules,
            &self.tiers,
            platform.and_then(|p| self.commission(p)),
        )
    }

    /// Price every night of `span` and surface the minimum-stay constraint.
    pub fn quote_stay(
        &self,
        property: &Property,
        span: &DateSpan,
        platform: Option<&str>,
    ) -> Result<StayQuote, EngineError> {
        if span.start >= span.end {
            return Err(EngineError::InvalidSpan);
        }
        if span.nights() > MAX_QUOTE_NIGHTS {
            return Err(EngineError::LimitExceeded("stay too long to quote"));
        }

        let quotes: Vec<PriceQuote> = span
            .dates()
            .map(|date| self.quote(property, date, platform))
            .collect();
        let total = round_money(quotes.iter().map(|q| q.final_price).sum());
        let min_nights = quotes.iter().filter_map(|q| q.min_nights).max();

        Ok(StayQuote {
            property_id: property.id.clone(),
            span: *span,
            nights: quotes
                .into_iter()
                .map(|q| NightlyPrice {
                    date: q.date,
                    price: q.final_price,
                })
                .collect(),
            total,
            min_nights,
        })
    }
}
