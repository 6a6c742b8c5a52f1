use std::fs::File;
use std::io::{BufReader, Cursor, Read};

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::{debug, instrument, warn};

use crate::config::ReaderConfig;
use crate::error::{IngestError, Result};
use crate::pipeline::ingestion::header::HeaderRule;
use crate::types::{RawField, RawRow, RawValue, SourceDescriptor, SourceFormat, SourceInput};

/// A source line the reader could not turn into a row
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedLine {
    pub source_file: String,
    pub row_number: usize,
    pub reason: String,
}

pub type RowResult = std::result::Result<RawRow, MalformedLine>;

enum RowCursor {
    Delimited(csv::ByteRecordsIntoIter<Box<dyn Read + Send>>),
    Workbook {
        range: Range<Data>,
        next: usize,
        first_row: usize,
    },
    Extracted(std::iter::Enumerate<std::vec::IntoIter<Vec<RawValue>>>),
}

/// Lazy sequence of raw rows following the detected header.
///
/// Restarting means calling [`open_source`] again.
pub struct SourceRows {
    source_file: String,
    headers: Vec<String>,
    header_row: usize,
    cursor: RowCursor,
}

impl SourceRows {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// 1-based row number of the header
    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    fn build_row(&self, row_number: usize, values: Vec<RawValue>) -> RawRow {
        let fields = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, label)| RawField {
                label: label.clone(),
                value: values.get(i).cloned().unwrap_or(RawValue::Empty),
            })
            .collect();
        RawRow {
            source_file: self.source_file.clone(),
            row_number,
            fields,
        }
    }

    fn malformed(&self, row_number: usize, reason: impl Into<String>) -> MalformedLine {
        MalformedLine {
            source_file: self.source_file.clone(),
            row_number,
            reason: reason.into(),
        }
    }

    fn next_delimited(&mut self) -> Option<RowResult> {
        loop {
            let RowCursor::Delimited(records) = &mut self.cursor else {
                return None;
            };
            let record = match records.next()? {
                Ok(record) => record,
                Err(e) => {
                    let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                    return Some(Err(self.malformed(line, e.to_string())));
                }
            };
            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

            let mut values = Vec::with_capacity(record.len());
            for field in record.iter() {
                match std::str::from_utf8(field) {
                    Ok(s) => values.push(RawValue::text(s)),
                    Err(_) => {
                        return Some(Err(self.malformed(line, "line is not valid UTF-8")));
                    }
                }
            }
            if values.iter().all(RawValue::is_empty) {
                continue;
            }
            let extra = values
                .iter()
                .skip(self.headers.len())
                .filter(|v| !v.is_empty())
                .count();
            if extra > 0 {
                return Some(Err(self.malformed(
                    line,
                    format!(
                        "{} fields found but the header has {}",
                        self.headers.len() + extra,
                        self.headers.len()
                    ),
                )));
            }
            return Some(Ok(self.build_row(line, values)));
        }
    }

    fn next_workbook(&mut self) -> Option<RowResult> {
        loop {
            let RowCursor::Workbook {
                range,
                next,
                first_row,
            } = &mut self.cursor
            else {
                return None;
            };
            let (height, width) = range.get_size();
            let index = *next;
            if index >= height {
                return None;
            }
            *next += 1;
            let row_number = *first_row + index + 1;
            let values: Vec<RawValue> = (0..width)
                .map(|col| range.get((index, col)).map(cell_to_raw).unwrap_or(RawValue::Empty))
                .collect();
            if values.iter().all(RawValue::is_empty) {
                continue;
            }
            return Some(Ok(self.build_row(row_number, values)));
        }
    }

    fn next_extracted(&mut self) -> Option<RowResult> {
        loop {
            let RowCursor::Extracted(rows) = &mut self.cursor else {
                return None;
            };
            let (index, values) = rows.next()?;
            // header occupies row 1
            let row_number = index + 2;
            if values.iter().all(RawValue::is_empty) {
                continue;
            }
            return Some(Ok(self.build_row(row_number, values)));
        }
    }
}

impl Iterator for SourceRows {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor {
            RowCursor::Delimited(_) => self.next_delimited(),
            RowCursor::Workbook { .. } => self.next_workbook(),
            RowCursor::Extracted(_) => self.next_extracted(),
        }
    }
}

/// Convert a workbook cell into a tagged raw value
pub fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::String(s) => RawValue::text(s.as_str()),
        Data::Float(f) => RawValue::number(*f),
        Data::Int(i) => RawValue::number(*i as f64),
        Data::DateTime(dt) => RawValue::number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::text(s.as_str()),
        Data::Bool(b) => RawValue::Text(b.to_string()),
        Data::Error(_) | Data::Empty => RawValue::Empty,
    }
}

/// Open a source and position it just after its header row.
#[instrument(skip(descriptor, config), fields(source = %descriptor.name()))]
pub fn open_source(descriptor: &SourceDescriptor, config: &ReaderConfig) -> Result<SourceRows> {
    let name = descriptor.name();

    if let SourceInput::Rows { headers, rows, .. } = &descriptor.input {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(IngestError::EmptySource(name));
        }
        return Ok(SourceRows {
            source_file: name,
            headers: headers.iter().map(|h| h.trim().to_string()).collect(),
            header_row: 1,
            cursor: RowCursor::Extracted(rows.clone().into_iter().enumerate()),
        });
    }

    let format = descriptor
        .resolved_format()
        .ok_or_else(|| IngestError::UnsupportedFormat(name.clone()))?;

    match format {
        SourceFormat::DelimitedText => open_delimited(descriptor, &name, config),
        SourceFormat::Workbook => open_workbook(descriptor, &name, config),
    }
}

fn open_delimited(
    descriptor: &SourceDescriptor,
    name: &str,
    config: &ReaderConfig,
) -> Result<SourceRows> {
    let source: Box<dyn Read + Send> = match &descriptor.input {
        SourceInput::Path(path) => Box::new(BufReader::new(File::open(path)?)),
        SourceInput::Bytes { data, .. } => Box::new(Cursor::new(data.clone())),
        SourceInput::Rows { .. } => return Err(IngestError::UnsupportedFormat(name.to_string())),
    };

    let mut records = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(config.delimiter as u8)
        .from_reader(source)
        .into_byte_records();

    // First non-empty line is the header
    let (headers, header_row) = loop {
        let record = match records.next() {
            Some(record) => record?,
            None => return Err(IngestError::EmptySource(name.to_string())),
        };
        let labels: Vec<String> = record
            .iter()
            .map(|f| String::from_utf8_lossy(f).trim().to_string())
            .collect();
        if labels.iter().all(|l| l.is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line() as usize).unwrap_or(1);
        break (labels, line);
    };
    let mut headers = headers;
    if let Some(first) = headers.first_mut() {
        *first = first.trim_start_matches('\u{feff}').trim().to_string();
    }

    debug!("Delimited header at line {}: {:?}", header_row, headers);
    Ok(SourceRows {
        source_file: name.to_string(),
        headers,
        header_row,
        cursor: RowCursor::Delimited(records),
    })
}

fn open_workbook(
    descriptor: &SourceDescriptor,
    name: &str,
    config: &ReaderConfig,
) -> Result<SourceRows> {
    let range = match &descriptor.input {
        SourceInput::Path(path) => {
            let mut workbook = open_workbook_auto(path)?;
            first_sheet(&mut workbook, name)?
        }
        SourceInput::Bytes { data, .. } => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.clone()))?;
            first_sheet(&mut workbook, name)?
        }
        SourceInput::Rows { .. } => return Err(IngestError::UnsupportedFormat(name.to_string())),
    };

    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let scan: Vec<Vec<String>> = range
        .rows()
        .take(config.max_header_scan_rows)
        .map(|row| {
            row.iter()
                .map(|c| cell_to_raw(c).as_text().unwrap_or_default())
                .collect()
        })
        .collect();
    if scan.is_empty() {
        return Err(IngestError::EmptySource(name.to_string()));
    }

    let index = HeaderRule::new(config.min_header_cells)
        .find(&scan, config.max_header_scan_rows)
        .ok_or_else(|| {
            warn!("❌ No header row found in {}", name);
            IngestError::HeaderNotFound {
                file: name.to_string(),
                scanned: scan.len(),
            }
        })?;
    let headers: Vec<String> = scan[index].iter().map(|h| h.trim().to_string()).collect();
    let header_row = first_row + index + 1;

    debug!("Workbook header at row {}: {:?}", header_row, headers);
    Ok(SourceRows {
        source_file: name.to_string(),
        headers,
        header_row,
        cursor: RowCursor::Workbook {
            range,
            next: index + 1,
            first_row,
        },
    })
}

fn first_sheet<RS>(workbook: &mut calamine::Sheets<RS>, name: &str) -> Result<Range<Data>>
where
    RS: std::io::Read + std::io::Seek,
{
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::EmptySource(name.to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;
    if range.is_empty() {
        return Err(IngestError::EmptySource(name.to_string()));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SupplierRef;

    fn csv_source(name: &str, body: &[u8]) -> SourceDescriptor {
        SourceDescriptor {
            input: SourceInput::Bytes {
                name: name.to_string(),
                data: body.to_vec(),
            },
            format: None,
            supplier: SupplierRef::new("sup-1"),
            mapping_override: Default::default(),
        }
    }

    #[test]
    fn test_delimited_rows_keep_line_numbers() {
        let source = csv_source(
            "list.csv",
            b"\xEF\xBB\xBFSKU,Name,Cost\nA1,Amp,100\n\nB2,Cable,\"1 234,50\"\n",
        );
        let rows: Vec<_> = open_source(&source, &ReaderConfig::default())
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.fields[0].label, "SKU");
        assert_eq!(first.row_number, 2);
        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.row_number, 4);
        assert_eq!(second.fields[2].value, RawValue::Text("1 234,50".into()));
    }

    #[test]
    fn test_malformed_lines_are_reported_not_fatal() {
        let source = csv_source(
            "list.csv",
            b"SKU,Name\nA1,Amp,extra\nB\xFF2,Bad\nC3,Cable\n",
        );
        let rows: Vec<_> = open_source(&source, &ReaderConfig::default())
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_err());
        assert!(rows[1].is_err());
        assert_eq!(rows[2].as_ref().unwrap().row_number, 4);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let source = csv_source("list.csv", b"SKU,Name,Cost\nA1,Amp\n");
        let row = open_source(&source, &ReaderConfig::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(row.fields.len(), 3);
        assert_eq!(row.fields[2].value, RawValue::Empty);
    }

    #[test]
    fn test_semicolon_delimiter() {
        let source = csv_source("list.csv", b"SKU;Name;Cost\nA1;Amp;100,00\n");
        let config = ReaderConfig {
            delimiter: ';',
            ..Default::default()
        };
        let row = open_source(&source, &config).unwrap().next().unwrap().unwrap();
        assert_eq!(row.fields[2].value, RawValue::Text("100,00".into()));
    }

    #[test]
    fn test_empty_source_is_structural() {
        let source = csv_source("empty.csv", b"\n\n");
        let err = open_source(&source, &ReaderConfig::default()).err().unwrap();
        assert!(matches!(err, IngestError::EmptySource(_)));
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let source = csv_source("list.pdf", b"SKU,Name\n");
        let err = open_source(&source, &ReaderConfig::default()).err().unwrap();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_extracted_rows_start_after_header() {
        let source = SourceDescriptor::from_rows(
            "upload",
            vec!["sku".into(), "name".into()],
            vec![
                vec![RawValue::text("A1"), RawValue::text("Amp")],
                vec![RawValue::Empty, RawValue::Empty],
                vec![RawValue::text("B2"), RawValue::text("Cable")],
            ],
            SupplierRef::new("sup-1"),
        );
        let rows: Vec<_> = open_source(&source, &ReaderConfig::default())
            .unwrap()
            .map(|r| r.unwrap().row_number)
            .collect();
        assert_eq!(rows, vec![2, 4]);
    }

    #[test]
    fn test_workbook_cells_are_tagged() {
        assert_eq!(cell_to_raw(&Data::Empty), RawValue::Empty);
        assert_eq!(cell_to_raw(&Data::Int(7)), RawValue::number(7.0));
        assert_eq!(cell_to_raw(&Data::Bool(true)), RawValue::Text("true".into()));
        assert_eq!(
            cell_to_raw(&Data::String("  ".into())),
            RawValue::Empty
        );
    }
}
