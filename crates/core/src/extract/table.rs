use scraper::{ElementRef, Html, Selector};

use crate::domain::stock::{StockRecord, TOP_N, UNKNOWN_VALUE};

/// A table qualifies as a ranking table when its aggregate text contains one
/// of these markers (case-insensitive).
const TABLE_MARKERS: &[&str] = &["symbol", "ticker"];

/// Candidate header substrings per column. Within each list the headers are
/// scanned left to right and the first containing match wins; lists are
/// resolved independently, so ambiguous headers may map two columns to the
/// same index.
const SYMBOL_HEADERS: &[&str] = &["symbol", "ticker"];
const NAME_HEADERS: &[&str] = &["name", "company"];
const PRICE_HEADERS: &[&str] = &["price", "last"];
const MARKET_CAP_HEADERS: &[&str] = &["market cap", "marketcap", "mkt cap"];

/// Extracts up to [`TOP_N`] records from the first ranking table in `html`.
///
/// This never fails: a document without a usable table, or one whose header
/// row is missing, yields an empty vector, and the caller decides whether to
/// try another source. Ranks are assigned densely (1-based) over the rows
/// that actually produce a record, so malformed rows never leave gaps.
pub fn extract_top_stocks(html: &str) -> Vec<StockRecord> {
    let document = Html::parse_document(html);

    let table_sel = Selector::parse("table").unwrap();
    let header_row_sel = Selector::parse("thead tr").unwrap();
    let header_cell_sel = Selector::parse("th").unwrap();
    let body_row_sel = Selector::parse("tbody tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();
    let link_sel = Selector::parse("a").unwrap();

    let Some(table) = document.select(&table_sel).find(is_ranking_table) else {
        return Vec::new();
    };

    let Some(header_row) = table.select(&header_row_sel).next() else {
        return Vec::new();
    };

    let headers: Vec<String> = header_row
        .select(&header_cell_sel)
        .map(|th| element_text(th).to_lowercase())
        .collect();
    let columns = ColumnMap::resolve(&headers);

    let mut records = Vec::new();
    for row in table.select(&body_row_sel).take(TOP_N) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();

        // Every column the header claims must physically exist in the row;
        // rows that fall short are dropped, not errors.
        if cells.len() < columns.required_cells() {
            continue;
        }

        let rank = records.len() as u32 + 1;
        records.push(StockRecord {
            symbol: linked_cell_text(&cells, columns.symbol, &link_sel)
                .unwrap_or_else(|| format!("Unknown-{rank}")),
            name: linked_cell_text(&cells, columns.name, &link_sel)
                .unwrap_or_else(|| format!("Unknown Company {rank}")),
            stock_price: plain_cell_text(&cells, columns.price)
                .unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            market_cap: plain_cell_text(&cells, columns.market_cap)
                .unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            rank,
        });
    }

    records
}

fn is_ranking_table(table: &ElementRef) -> bool {
    let text = table.text().collect::<String>().to_lowercase();
    TABLE_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Resolved 0-based cell indices for the four output columns. `None` means
/// the page does not advertise that column and the record falls back to a
/// placeholder value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    symbol: Option<usize>,
    name: Option<usize>,
    price: Option<usize>,
    market_cap: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Self {
        Self {
            symbol: find_column(headers, SYMBOL_HEADERS),
            name: find_column(headers, NAME_HEADERS),
            price: find_column(headers, PRICE_HEADERS),
            market_cap: find_column(headers, MARKET_CAP_HEADERS),
        }
    }

    /// Cell count a row must have to cover every resolved column.
    fn required_cells(&self) -> usize {
        [self.symbol, self.name, self.price, self.market_cap]
            .into_iter()
            .flatten()
            .max()
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| candidates.iter().any(|c| header.contains(c)))
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Cell text for the symbol/name columns. Ranking pages usually wrap the
/// ticker in a link whose text is cleaner than the full cell content.
fn linked_cell_text(
    cells: &[ElementRef],
    column: Option<usize>,
    link_sel: &Selector,
) -> Option<String> {
    let cell = *cells.get(column?)?;
    match cell.select(link_sel).next() {
        Some(link) => Some(element_text(link)),
        None => Some(element_text(cell)),
    }
}

fn plain_cell_text(cells: &[ElementRef], column: Option<usize>) -> Option<String> {
    cells.get(column?).map(|cell| element_text(*cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><head></head><body>{body}</body></html>")
    }

    fn ranked_table(rows: &str) -> String {
        format!(
            "<table>\
             <thead><tr><th>Rank</th><th>Symbol</th><th>Name</th><th>Price</th><th>Market Cap</th></tr></thead>\
             <tbody>{rows}</tbody>\
             </table>"
        )
    }

    fn row(rank: &str, symbol: &str, name: &str, price: &str, cap: &str) -> String {
        format!("<tr><td>{rank}</td><td>{symbol}</td><td>{name}</td><td>{price}</td><td>{cap}</td></tr>")
    }

    #[test]
    fn returns_empty_when_no_table_qualifies() {
        assert!(extract_top_stocks(&page("<p>no tables here</p>")).is_empty());

        let unrelated = page(
            "<table><thead><tr><th>Fruit</th><th>Color</th></tr></thead>\
             <tbody><tr><td>Apple</td><td>Red</td></tr></tbody></table>",
        );
        assert!(extract_top_stocks(&unrelated).is_empty());
    }

    #[test]
    fn returns_empty_when_table_has_no_header_row() {
        let html = page(
            "<table><tbody>\
             <tr><td>AAPL</td><td>Apple ticker</td></tr>\
             </tbody></table>",
        );
        assert!(extract_top_stocks(&html).is_empty());
    }

    #[test]
    fn returns_empty_when_table_has_no_body_rows() {
        let html = page(&ranked_table(""));
        assert!(extract_top_stocks(&html).is_empty());
    }

    #[test]
    fn extracts_single_row_end_to_end() {
        let html = page(
            "<table>\
             <thead><tr><th>Symbol</th><th>Company</th><th>Price</th><th>Market Cap</th></tr></thead>\
             <tbody><tr><td>AAPL</td><td>Apple Inc</td><td>$150.00</td><td>$2.5T</td></tr></tbody>\
             </table>",
        );

        let records = extract_top_stocks(&html);
        assert_eq!(
            records,
            vec![StockRecord {
                symbol: "AAPL".to_string(),
                name: "Apple Inc".to_string(),
                stock_price: "$150.00".to_string(),
                market_cap: "$2.5T".to_string(),
                rank: 1,
            }]
        );
    }

    #[test]
    fn ranks_are_dense_and_start_at_one() {
        let rows: String = (1..=4)
            .map(|i| row(&i.to_string(), &format!("SYM{i}"), &format!("Company {i}"), "$1", "$1B"))
            .collect();
        let records = extract_top_stocks(&page(&ranked_table(&rows)));

        assert_eq!(records.len(), 4);
        let ranks: Vec<u32> = records.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(records[2].symbol, "SYM3");
    }

    #[test]
    fn caps_output_at_ten_rows() {
        let rows: String = (1..=15)
            .map(|i| row(&i.to_string(), &format!("S{i}"), &format!("N{i}"), "$1", "$1B"))
            .collect();
        let records = extract_top_stocks(&page(&ranked_table(&rows)));

        assert_eq!(records.len(), 10);
        assert_eq!(records[9].symbol, "S10");
    }

    #[test]
    fn short_rows_are_skipped_without_consuming_a_rank() {
        let rows = format!(
            "{}<tr><td>2</td><td>BAD</td></tr>{}",
            row("1", "GOOD1", "First", "$1", "$1B"),
            row("3", "GOOD2", "Second", "$2", "$2B"),
        );
        let records = extract_top_stocks(&page(&ranked_table(&rows)));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "GOOD1");
        assert_eq!(records[0].rank, 1);
        assert_eq!(records[1].symbol, "GOOD2");
        assert_eq!(records[1].rank, 2);
    }

    #[test]
    fn prefers_nested_link_text_for_symbol_and_name() {
        let html = page(
            "<table>\
             <thead><tr><th>Symbol</th><th>Name</th><th>Price</th></tr></thead>\
             <tbody><tr>\
             <td><a href=\"/stocks/msft\">MSFT</a><span>•</span></td>\
             <td><a href=\"/stocks/msft\">Microsoft</a> Corporation</td>\
             <td>$400.00</td>\
             </tr></tbody></table>",
        );

        let records = extract_top_stocks(&html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "MSFT");
        assert_eq!(records[0].name, "Microsoft");
    }

    #[test]
    fn missing_price_column_yields_unknown_prices() {
        let html = page(
            "<table>\
             <thead><tr><th>Symbol</th><th>Name</th><th>Market Cap</th></tr></thead>\
             <tbody>\
             <tr><td>AAPL</td><td>Apple</td><td>$2.5T</td></tr>\
             <tr><td>MSFT</td><td>Microsoft</td><td>$2.4T</td></tr>\
             </tbody></table>",
        );

        let records = extract_top_stocks(&html);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.stock_price == "Unknown"));
        assert_eq!(records[0].market_cap, "$2.5T");
    }

    #[test]
    fn unresolved_columns_fall_back_to_placeholders() {
        // The caption qualifies the table, but no header matches any column.
        let html = page(
            "<table>\
             <caption>ticker overview</caption>\
             <thead><tr><th>#</th><th>Value</th></tr></thead>\
             <tbody><tr><td>1</td><td>x</td></tr><tr><td>2</td><td>y</td></tr></tbody>\
             </table>",
        );

        let records = extract_top_stocks(&html);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "Unknown-1");
        assert_eq!(records[0].name, "Unknown Company 1");
        assert_eq!(records[1].symbol, "Unknown-2");
        assert_eq!(records[1].name, "Unknown Company 2");
        assert_eq!(records[1].stock_price, "Unknown");
        assert_eq!(records[1].market_cap, "Unknown");
    }

    #[test]
    fn header_matching_accepts_alternate_spellings() {
        let html = page(
            "<table>\
             <thead><tr><th>Ticker</th><th>Company</th><th>Last</th><th>Mkt Cap</th></tr></thead>\
             <tbody><tr><td>NVDA</td><td>NVIDIA</td><td>$900</td><td>$2.2T</td></tr></tbody>\
             </table>",
        );

        let records = extract_top_stocks(&html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "NVDA");
        assert_eq!(records[0].name, "NVIDIA");
        assert_eq!(records[0].stock_price, "$900");
        assert_eq!(records[0].market_cap, "$2.2T");
    }

    #[test]
    fn first_qualifying_table_wins() {
        let html = page(&format!(
            "<table><thead><tr><th>Fruit</th></tr></thead>\
             <tbody><tr><td>Apple</td></tr></tbody></table>\
             {}\
             <table><thead><tr><th>Symbol</th></tr></thead>\
             <tbody><tr><td>LATER</td></tr></tbody></table>",
            ranked_table(&row("1", "FIRST", "First Co", "$1", "$1B")),
        ));

        let records = extract_top_stocks(&html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "FIRST");
    }

    #[test]
    fn extraction_is_idempotent() {
        let rows: String = (1..=3)
            .map(|i| row(&i.to_string(), &format!("S{i}"), &format!("N{i}"), "$1", "$1B"))
            .collect();
        let html = page(&ranked_table(&rows));

        assert_eq!(extract_top_stocks(&html), extract_top_stocks(&html));
    }

    #[test]
    fn resolves_columns_independently() {
        let headers: Vec<String> = ["symbol / name", "price", "market cap"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let columns = ColumnMap::resolve(&headers);

        // An ambiguous first header claims both symbol and name.
        assert_eq!(columns.symbol, Some(0));
        assert_eq!(columns.name, Some(0));
        assert_eq!(columns.price, Some(1));
        assert_eq!(columns.market_cap, Some(2));
        assert_eq!(columns.required_cells(), 3);
    }
}
