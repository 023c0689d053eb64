use serde::{Deserialize, Serialize};

/// At most this many rows are taken from a ranking table.
pub const TOP_N: usize = 10;

/// Raw-text value used when a column is missing from the source page.
pub const UNKNOWN_VALUE: &str = "Unknown";

/// One row of the extracted top-stocks list.
///
/// `stock_price` and `market_cap` are raw page text, not parsed numbers;
/// they may carry currency symbols, suffixes like "2.5T", or be literally
/// "Unknown". The `marketCap` wire name is the persisted-artifact contract
/// the dashboard reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: String,
    pub name: String,
    pub stock_price: String,
    #[serde(rename = "marketCap")]
    pub market_cap: String,
    pub rank: u32,
}
