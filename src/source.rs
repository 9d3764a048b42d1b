use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::PriceBook;
use crate::model::*;

#[derive(Debug)]
pub enum SourceError {
    /// Remote side failed or could not be reached.
    Unavailable(String),
    Decode(String),
    Io(std::io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "source unavailable: {msg}"),
            SourceError::Decode(msg) => write!(f, "decode error: {msg}"),
            SourceError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e.to_string())
    }
}

/// `GET reservations?propertyIds=..&from=..&to=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationQuery {
    pub property_ids: Vec<PropertyId>,
    pub window: DateSpan,
}

/// Remote data API the calendar reads from. An `Ok(vec![])` means
/// "confirmed empty"; failures must come back as `Err`.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn properties(&self) -> Result<Vec<Property>, SourceError>;

    async fn reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>, SourceError>;

    async fn blocks(&self, property_ids: &[PropertyId]) -> Result<Vec<Block>, SourceError>;

    async fn price_book(&self, property_ids: &[PropertyId]) -> Result<PriceBook, SourceError>;
}

/// Whole-portfolio snapshot in the remote API's JSON shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub pricing: PriceBook,
}

/// Serves a fixed [`Dataset`] with the same filtering the remote API applies.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    dataset: Dataset,
}

impl StaticSource {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::new(serde_json::from_str(&raw)?))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

#[async_trait]
impl CalendarSource for StaticSource {
    async fn properties(&self) -> Result<Vec<Property>, SourceError> {
        Ok(self.dataset.properties.clone())
    }

    async fn reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>, SourceError> {
        Ok(self
            .dataset
            .reservations
            .iter()
            .filter(|r| query.property_ids.contains(&r.property_id))
            .filter(|r| r.check_in < query.window.end && r.check_out > query.window.start)
            .cloned()
            .collect())
    }

    async fn blocks(&self, property_ids: &[PropertyId]) -> Result<Vec<Block>, SourceError> {
        Ok(self
            .dataset
            .blocks
            .iter()
            .filter(|b| property_ids.contains(&b.property_id))
            .cloned()
            .collect())
    }

    async fn price_book(&self, property_ids: &[PropertyId]) -> Result<PriceBook, SourceError> {
        let pricing = &self.dataset.pricing;
        Ok(PriceBook {
            rules: pricing
                .rules
                .iter()
                .filter(|r| property_ids.contains(&r.property_id))
                .cloned()
                .collect(),
            tiers: pricing
                .tiers
                .iter()
                .filter(|t| t.property_id.as_ref().is_none_or(|p| property_ids.contains(p)))
                .cloned()
                .collect(),
            commissions: pricing.commissions.clone(),
        })
    }
}
