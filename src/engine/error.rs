#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Stay is shorter than the strongest seasonal minimum covering it.
    MinStayNotMet { required: u32, requested: i64 },
    /// Pairs of seasonal tier names whose spans share at least one date.
    OverlappingTiers(Vec<(String, String)>),
    InvalidSpan,
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::MinStayNotMet {
                required,
                requested,
            } => write!(
                f,
                "minimum stay is {required} nights, requested {requested}"
            ),
            EngineError::OverlappingTiers(pairs) => {
                write!(f, "overlapping seasonal tiers:")?;
                for (a, b) in pairs {
                    write!(f, " [{a} / {b}]")?;
                }
                Ok(())
            }
            EngineError::InvalidSpan => write!(f, "checkout must be after check-in"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
