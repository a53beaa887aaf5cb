pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://cdn.tsetmc.com";

pub const PATH_LISTING: &str = "/api/ClosingPrice/GetMarketWatch";
pub const PATH_SEARCH: &str = "/api/Instrument/GetInstrumentSearch";
pub const PATH_SNAPSHOT: &str = "/api/ClosingPrice/GetClosingPriceInfo";
pub const PATH_HISTORY: &str = "/api/ClosingPrice/GetClosingPriceDailyList";

pub const ROOT_LISTING: &str = "marketwatch";
pub const ROOT_SEARCH: &str = "instrumentSearch";
pub const ROOT_SNAPSHOT: &str = "closingPriceInfo";
pub const ROOT_HISTORY: &str = "closingPriceDaily";

pub const FIELD_INS_CODE: &str = "insCode";
pub const FIELD_SYMBOL: &[&str] = &["lVal18AFC", "lva"];
pub const FIELD_NAME: &[&str] = &["lVal30", "lvc"];
pub const FIELD_LATIN_NAME: &str = "lVal18";
pub const FIELD_ISIN: &str = "cIsin";
pub const FIELD_MARKET: &str = "flowTitle";
pub const FIELD_TYPE_CODE: &str = "yVal";
pub const FIELD_ACTIVE: &[&str] = &["isActive", "active"];

pub const FIELD_DATE: &str = "dEven";
pub const FIELD_TIME: &str = "hEven";
pub const FIELD_OPEN: &[&str] = &["priceFirst", "price_first"];
pub const FIELD_HIGH: &str = "priceMax";
pub const FIELD_LOW: &str = "priceMin";
pub const FIELD_CLOSE: &str = "pClosing";
pub const FIELD_LAST: &str = "pDrCotVal";
pub const FIELD_PREVIOUS_CLOSE: &str = "priceYesterday";
pub const FIELD_TRADE_COUNT: &str = "zTotTran";
pub const FIELD_VOLUME: &str = "qTotTran5J";
pub const FIELD_VALUE: &str = "qTotCap";

/// Builds the snapshot URL path for an instrument.
pub fn snapshot_path(identifier: &str) -> String {
    format!("{PATH_SNAPSHOT}/{identifier}")
}

/// Builds the daily history URL path for an instrument. A count of zero asks
/// upstream for every recorded session.
pub fn history_path(identifier: &str, count: u32) -> String {
    format!("{PATH_HISTORY}/{identifier}/{count}")
}

pub fn search_path(query: &str) -> String {
    format!("{PATH_SEARCH}/{query}")
}
