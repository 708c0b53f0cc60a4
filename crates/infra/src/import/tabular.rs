//! Tabular product source.

use std::collections::HashMap;
use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};

/// Columns every upload must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = ["name", "price", "category_path"];

/// Header line of the downloadable template, in column order.
pub const TEMPLATE_COLUMNS: [&str; 5] = [
    "name",
    "price",
    "category_path",
    "description",
    "stock_quantity",
];

/// Index of the first data row: the header occupies line 1.
pub const FIRST_DATA_ROW: i64 = 2;

/// Upload template: just the header line.
pub fn csv_template() -> String {
    let mut line = TEMPLATE_COLUMNS.join(",");
    line.push('\n');
    line
}

/// One data row, addressed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// Record position, counting the header as 1.
    pub index: i64,
    fields: HashMap<String, String>,
}

impl CsvRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// A parsed row, or the position and reason of a row that could not be parsed.
pub type RowOutcome = Result<CsvRow, (i64, String)>;

/// Result of reading a CSV upload's header.
#[derive(Debug)]
pub enum CsvRead<R> {
    /// The header lacks required columns (sorted).
    MissingColumns(Vec<String>),
    /// Rows in file order, read on demand.
    Rows(CsvRows<R>),
}

/// Lazily parsed data rows.
///
/// Yields `Ok(Err(..))` for a malformed row and carries on; an `Err` means the
/// source itself failed and ends the stream.
#[derive(Debug)]
pub struct CsvRows<R> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    record: StringRecord,
    index: i64,
    done: bool,
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<RowOutcome, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let index = self.index;
        let item = match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                return None;
            }
            Ok(true) => {
                let fields = self
                    .headers
                    .iter()
                    .zip(self.record.iter())
                    .map(|(h, v)| (h.clone(), v.to_string()))
                    .collect();
                Ok(Ok(CsvRow { index, fields }))
            }
            Err(err) if is_row_level(&err) => Ok(Err((index, format!("malformed row: {err}")))),
            Err(err) => {
                self.done = true;
                Err(err)
            }
        };
        self.index += 1;
        Some(item)
    }
}

/// Read the header and hand back the rows for streaming.
///
/// The header is validated before any row is touched. Rows are numbered by
/// record, not by line: blank lines are skipped and a quoted field may span
/// several lines.
pub fn read_csv<R: Read>(source: R) -> Result<CsvRead<R>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(source);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Ok(CsvRead::MissingColumns(missing));
    }

    Ok(CsvRead::Rows(CsvRows {
        reader,
        headers,
        record: StringRecord::new(),
        index: FIRST_DATA_ROW,
        done: false,
    }))
}

fn is_row_level(err: &csv::Error) -> bool {
    matches!(
        err.kind(),
        csv::ErrorKind::Utf8 { .. } | csv::ErrorKind::UnequalLengths { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(input: &str) -> Vec<RowOutcome> {
        match read_csv(input.as_bytes()).unwrap() {
            CsvRead::Rows(rows) => rows.collect::<Result<Vec<_>, _>>().unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn template_is_header_only() {
        assert_eq!(
            csv_template(),
            "name,price,category_path,description,stock_quantity\n"
        );
    }

    #[test]
    fn missing_columns_are_sorted() {
        let read = read_csv("title,category_path\nx,y\n".as_bytes()).unwrap();
        match read {
            CsvRead::MissingColumns(cols) => assert_eq!(cols, vec!["name", "price"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rows_are_numbered_from_two() {
        let rows = rows("name,price,category_path\nA,1.00,X\nB,2.00,Y\n");
        let indexes: Vec<i64> = rows.iter().map(|r| r.as_ref().unwrap().index).collect();
        assert_eq!(indexes, vec![2, 3]);
    }

    #[test]
    fn quoted_paths_and_extra_columns_are_kept() {
        let rows = rows(
            "name,price,category_path,description\nBaguette,2.50,\"All Products>Bakery>Bread\", crusty \n",
        );
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.get("category_path"), Some("All Products>Bakery>Bread"));
        assert_eq!(row.get("description"), Some("crusty"));
        assert_eq!(row.get("stock_quantity"), None);
    }

    #[test]
    fn short_rows_leave_trailing_columns_absent() {
        let rows = rows("name,price,category_path\nA,1.00\n");
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.get("price"), Some("1.00"));
        assert_eq!(row.get("category_path"), None);
    }

    #[test]
    fn numbering_counts_records_not_lines() {
        let rows = rows("name,price,category_path\n\nA,1.00,X\n\n\"B\nC\",2.00,Y\nD,3.00,Z\n");
        let indexes: Vec<i64> = rows.iter().map(|r| r.as_ref().unwrap().index).collect();
        assert_eq!(indexes, vec![2, 3, 4]);
        assert_eq!(rows[1].as_ref().unwrap().get("name"), Some("B\nC"));
    }

    #[test]
    fn rows_are_read_on_demand() {
        let mut rows = match read_csv("name,price,category_path\nA,1.00,X\nB,2.00,Y\n".as_bytes()).unwrap() {
            CsvRead::Rows(rows) => rows,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(rows.next().unwrap().unwrap().unwrap().get("name"), Some("A"));
        assert_eq!(rows.next().unwrap().unwrap().unwrap().index, 3);
        assert!(rows.next().is_none());
        assert!(rows.next().is_none());
    }
}
