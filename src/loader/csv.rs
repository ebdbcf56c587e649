use std::io::Cursor;

use anyhow::{Context, Result, ensure};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvParseOptions, CsvReadOptions, CsvReader}};

/// Read DataFrame from CSV bytes.
///
/// The first line is the header and every field is read as a string; fields are looked up
/// by header name later. Quoting is disabled, so a comma inside quotes still splits the
/// field: the upstream exports never quote, and this keeps parsing identical to theirs.
/// Short rows are padded with nulls and long rows truncated.
pub(crate) fn read_from_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let text = std::str::from_utf8(bytes).context("CSV body is not UTF-8")?;
    ensure!(!text.trim().is_empty(), "CSV body is empty");

    let parse_options = CsvParseOptions::default()
        .with_quote_char(None)
        .with_truncate_ragged_lines(true);
    let options = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(parse_options);

    let df = CsvReader::new(Cursor::new(bytes))
        .with_options(options)
        .finish()
        .context("Failed to parse CSV")?;
    Ok(df)
}
