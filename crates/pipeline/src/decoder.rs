//! Tabular source boundary.
//!
//! File decoding is an external collaborator: anything that can turn an
//! uploaded artifact into ordered rows of column → raw value implements
//! [`TabularSource`]. A delimited-text implementation ships here; richer
//! formats (spreadsheets) plug in behind the same trait.

use std::path::Path;

use async_trait::async_trait;
use tally_core::ingest::RawRow;

use crate::error::{PipelineError, PipelineResult};

/// Rows returned for a preview request.
pub const PREVIEW_ROWS: usize = 20;

/// File type token for delimited text uploads.
pub const FILE_TYPE_CSV: &str = "csv";
/// File type token for spreadsheet uploads.
pub const FILE_TYPE_EXCEL: &str = "excel";

/// A fully decoded source file.
#[derive(Debug, Clone)]
pub struct DecodedTable {
    /// Rows in file order.
    pub rows: Vec<RawRow>,
    /// Distinct column names, in first-seen order.
    pub columns: Vec<String>,
}

/// The first [`PREVIEW_ROWS`] rows plus the total count, for mapping UIs.
#[derive(Debug, Clone)]
pub struct TablePreview {
    pub rows: Vec<RawRow>,
    pub total_rows: usize,
    pub columns: Vec<String>,
}

/// Decodes an uploaded artifact into row objects.
#[async_trait]
pub trait TabularSource: Send + Sync {
    /// Decode the whole file.
    async fn decode(&self, path: &Path, file_type: &str) -> PipelineResult<DecodedTable>;

    /// Decode just enough for a preview. The default decodes everything
    /// and truncates.
    async fn preview(&self, path: &Path, file_type: &str) -> PipelineResult<TablePreview> {
        let table = self.decode(path, file_type).await?;
        let total_rows = table.rows.len();
        let rows = table.rows.into_iter().take(PREVIEW_ROWS).collect();
        Ok(TablePreview {
            rows,
            total_rows,
            columns: table.columns,
        })
    }
}

/// Derive the stored file type from an uploaded file name.
pub fn file_type_from_name(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".csv") {
        FILE_TYPE_CSV
    } else {
        FILE_TYPE_EXCEL
    }
}

// ---------------------------------------------------------------------------
// Delimited-text implementation
// ---------------------------------------------------------------------------

/// Header-row CSV decoder.
///
/// Spreadsheet (`excel`) artifacts are not decoded here; deployments that
/// accept them supply their own [`TabularSource`].
#[derive(Debug, Clone, Default)]
pub struct CsvTable;

#[async_trait]
impl TabularSource for CsvTable {
    async fn decode(&self, path: &Path, file_type: &str) -> PipelineResult<DecodedTable> {
        if file_type != FILE_TYPE_CSV {
            return Err(PipelineError::Decode(format!(
                "Unsupported file type '{file_type}'; this decoder handles '{FILE_TYPE_CSV}' only"
            )));
        }

        let content = tokio::fs::read_to_string(path).await?;
        decode_csv_content(&content)
    }
}

fn decode_csv_content(content: &str) -> PipelineResult<DecodedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::Decode(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PipelineError::Decode(e.to_string()))?;
        let mut row = RawRow::new();
        for (idx, value) in record.iter().enumerate() {
            if let Some(column) = columns.get(idx) {
                row.insert(column.clone(), value.to_string());
            }
        }
        rows.push(row);
    }

    Ok(DecodedTable { rows, columns })
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// A pre-decoded table. Used by tests and by callers whose upstream
/// already produced row objects.
#[derive(Debug, Clone)]
pub struct StaticTable {
    table: DecodedTable,
}

impl StaticTable {
    pub fn new(rows: Vec<RawRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for column in row.keys() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.clone());
                }
            }
        }
        Self {
            table: DecodedTable { rows, columns },
        }
    }
}

#[async_trait]
impl TabularSource for StaticTable {
    async fn decode(&self, _path: &Path, _file_type: &str) -> PipelineResult<DecodedTable> {
        Ok(self.table.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_content_decodes_with_headers() {
        let table = decode_csv_content(
            "Txn ID,Amount,Reference,Value Date\n\
             TXN-1,100.50,REF-1,2024-03-01\n\
             TXN-2,99.95,REF-2,2024-03-02\n",
        )
        .unwrap();

        assert_eq!(table.columns, vec!["Txn ID", "Amount", "Reference", "Value Date"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("Txn ID").map(String::as_str), Some("TXN-1"));
        assert_eq!(table.rows[1].get("Amount").map(String::as_str), Some("99.95"));
    }

    #[test]
    fn short_rows_omit_missing_cells() {
        let table = decode_csv_content("a,b,c\n1,2\n").unwrap();
        assert_eq!(table.rows[0].len(), 2);
        assert!(!table.rows[0].contains_key("c"));
    }

    #[tokio::test]
    async fn static_table_previews_first_twenty_rows() {
        let rows: Vec<RawRow> = (0..50)
            .map(|i| {
                let mut row = RawRow::new();
                row.insert("n".to_string(), i.to_string());
                row
            })
            .collect();
        let source = StaticTable::new(rows);

        let preview = source
            .preview(Path::new("unused"), FILE_TYPE_CSV)
            .await
            .unwrap();
        assert_eq!(preview.rows.len(), PREVIEW_ROWS);
        assert_eq!(preview.total_rows, 50);
        assert_eq!(preview.columns, vec!["n"]);
    }

    #[tokio::test]
    async fn csv_decoder_rejects_other_file_types() {
        let result = CsvTable.decode(Path::new("unused.xlsx"), FILE_TYPE_EXCEL).await;
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn file_type_derivation() {
        assert_eq!(file_type_from_name("bank_export.CSV"), FILE_TYPE_CSV);
        assert_eq!(file_type_from_name("bank_export.xlsx"), FILE_TYPE_EXCEL);
        assert_eq!(file_type_from_name("bank_export.xls"), FILE_TYPE_EXCEL);
    }
}
