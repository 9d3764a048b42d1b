mod conflict;
mod error;
mod occupancy;
mod pricing;

pub use conflict::{
    Conflict, ConflictCheck, DecoratedReservation, decorate_with_conflicts, find_conflicts,
    would_conflict,
};
pub use error::EngineError;
pub use occupancy::OccupancyIndex;
pub use pricing::{
    Adjustment, BaseSource, CommissionStage, NightlyPrice, PlatformCommission, PriceBook,
    PriceBreakdown, PriceQuote, PriceRule, SeasonalStage, SeasonalTier, StayQuote, TierType,
    find_overlapping_tiers, resolve_price, round_money,
};
