/// Widest calendar window a single refresh may cover.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;

/// Max items in any list filter (properties, tags, cities, ...).
pub const MAX_SELECTED_ITEMS: usize = 500;

/// Max length of a single list filter item.
pub const MAX_ITEM_LEN: usize = 128;

/// Max length of the free-text search filter.
pub const MAX_SEARCH_LEN: usize = 256;

/// Query strings longer than this are ignored wholesale on load.
pub const MAX_QUERY_STRING_LEN: usize = 16 * 1024;

/// Max nights a stay quote will price.
pub const MAX_QUOTE_NIGHTS: i64 = 366;

/// Settled views kept per facade before older keys are dropped.
pub const MAX_CACHED_VIEWS: usize = 32;
