use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, warn};

use crate::table::{Table, Value};

/// Open `path` and load it as a headered CSV table.
///
/// Any failure here is fatal to the pipeline run: the caller gets an error
/// and no partial table.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_csv_path<P: AsRef<Path>>(path: P) -> Result<Table> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path.as_ref()))?;
    load_csv(file).with_context(|| format!("Failed to load CSV file: {:?}", path.as_ref()))
}

/// Read a headered CSV stream into a raw string table.
///
/// Cells are kept as strings (empty cells become `Null`); all typing happens
/// later in normalization. Ragged rows are tolerated: short rows are padded
/// with nulls, long rows truncated to the header width.
pub fn load_csv<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header line")?;
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(anyhow!("CSV input has no header line"));
    }
    let columns: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
    let width = columns.len();

    let mut table = Table::new(columns);
    let mut ragged = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        if record.len() != width {
            ragged += 1;
        }
        let mut row = Vec::with_capacity(width);
        for i in 0..width {
            match record.get(i).map(str::trim) {
                Some(s) if !s.is_empty() => row.push(Value::Str(s.to_string())),
                _ => row.push(Value::Null),
            }
        }
        table.rows.push(row);
    }

    if ragged > 0 {
        warn!(ragged, "rows with unexpected field count were padded or truncated");
    }
    debug!(rows = table.len(), cols = width, "loaded CSV table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,salescope=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    #[test]
    fn test_load_csv_basic() -> Result<()> {
        init_test_logging();
        let csv = "id,order_date,qty_ordered\n1001,2022-01-05,2\n1002,2022-02-10,\n";
        let table = load_csv(Cursor::new(csv))?;

        assert_eq!(table.columns, vec!["id", "order_date", "qty_ordered"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "id"), Some(&Value::Str("1001".into())));
        assert_eq!(table.value(1, "qty_ordered"), Some(&Value::Null));
        Ok(())
    }

    #[test]
    fn test_load_csv_path_roundtrip() -> Result<()> {
        init_test_logging();
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"sku_name,category\nWidget,Gadgets\n")?;

        let table = load_csv_path(tmp.path())?;
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "category"), Some(&Value::Str("Gadgets".into())));
        Ok(())
    }

    #[test]
    fn test_load_csv_ragged_rows() -> Result<()> {
        let csv = "a,b,c\n1,2\n1,2,3,4\n";
        let table = load_csv(Cursor::new(csv))?;

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.value(0, "c"), Some(&Value::Null));
        assert_eq!(table.rows[1].len(), 3);
        Ok(())
    }

    #[test]
    fn test_load_csv_header_only() -> Result<()> {
        let table = load_csv(Cursor::new("a,b\n"))?;
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 2);
        Ok(())
    }

    #[test]
    fn test_load_csv_empty_input_fails() {
        assert!(load_csv(Cursor::new("")).is_err());
    }

    #[test]
    fn test_load_csv_path_missing_file_fails() {
        assert!(load_csv_path("/nonexistent/sales.csv").is_err());
    }
}
