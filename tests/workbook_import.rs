use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_decimal_macros::dec;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use pricelist_ingest::config::{Config, ReaderConfig};
use pricelist_ingest::error::IngestError;
use pricelist_ingest::pipeline::ingestion::{open_source, ProgressStatus};
use pricelist_ingest::pipeline::processing::quality_gate::IssueKind;
use pricelist_ingest::pipeline::storage::{InMemoryStorage, Storage};
use pricelist_ingest::pipeline::{FileStatus, Orchestrator};
use pricelist_ingest::types::{RawValue, SourceDescriptor, SupplierRef};

enum Cell {
    Text(&'static str),
    Number(f64),
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Prices" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

fn column(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// Minimal single-sheet .xlsx; `rows` are (1-based sheet row, cells from column A)
fn write_workbook(dir: &Path, name: &str, rows: &[(usize, Vec<Cell>)]) -> PathBuf {
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row, cells) in rows {
        sheet.push_str(&format!(r#"<row r="{}">"#, row));
        for (i, cell) in cells.iter().enumerate() {
            let reference = format!("{}{}", column(i), row);
            match cell {
                Cell::Text(text) => sheet.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    reference, text
                )),
                Cell::Number(value) => {
                    sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value))
                }
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let path = dir.join(name);
    let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (entry, body) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ] {
        zip.start_file(entry, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Banner rows above the header, a blank row between records, sheet starting at row 2
fn banner_workbook(dir: &Path) -> PathBuf {
    write_workbook(
        dir,
        "acme.xlsx",
        &[
            (2, vec![Cell::Text("ACME Pro Audio Product Catalogue - Model Year 2025")]),
            (3, vec![Cell::Text("Prices valid from 1 December 2025")]),
            (
                4,
                vec![Cell::Text("SKU"), Cell::Text("Product Name"), Cell::Text("Cost Price")],
            ),
            (
                5,
                vec![Cell::Text("amp-1"), Cell::Text("Amplifier"), Cell::Number(1234.5)],
            ),
            (
                7,
                vec![Cell::Text("SPK-2"), Cell::Text("Speaker"), Cell::Number(450.0)],
            ),
        ],
    )
}

fn source(path: &Path) -> SourceDescriptor {
    SourceDescriptor::from_path(path, SupplierRef::new("acme"))
}

#[test]
fn test_workbook_header_found_below_banner() {
    let dir = TempDir::new().unwrap();
    let path = banner_workbook(dir.path());

    let rows = open_source(&source(&path), &ReaderConfig::default()).unwrap();
    assert_eq!(rows.header_row(), 4);
    assert_eq!(rows.headers(), ["SKU", "Product Name", "Cost Price"]);

    let rows: Vec<_> = rows.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].row_number, 5);
    assert_eq!(rows[0].fields[2].value, RawValue::number(1234.5));
    assert_eq!(rows[1].row_number, 7);
}

#[test]
fn test_workbook_without_header_in_scan_window() {
    let dir = TempDir::new().unwrap();
    let mut rows: Vec<(usize, Vec<Cell>)> = (1..=11)
        .map(|r| (r, vec![Cell::Text("Notes"), Cell::Text("see below"), Cell::Text("-")]))
        .collect();
    rows.push((
        12,
        vec![Cell::Text("SKU"), Cell::Text("Product Name"), Cell::Text("Cost Price")],
    ));
    let path = write_workbook(dir.path(), "late.xlsx", &rows);

    let err = open_source(&source(&path), &ReaderConfig::default()).err().unwrap();
    assert!(matches!(err, IngestError::HeaderNotFound { scanned: 10, .. }));
    assert!(err.is_structural());

    let wider = ReaderConfig {
        max_header_scan_rows: 12,
        ..Default::default()
    };
    assert_eq!(open_source(&source(&path), &wider).unwrap().header_row(), 12);
}

#[tokio::test]
async fn test_workbook_import_end_to_end() {
    let dir = TempDir::new().unwrap();
    let good = banner_workbook(dir.path());
    let late = write_workbook(
        dir.path(),
        "late.xlsx",
        &(1..=12)
            .map(|r| (r, vec![Cell::Text("Notes"), Cell::Text("see below"), Cell::Text("-")]))
            .collect::<Vec<_>>(),
    );
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let orchestrator = Orchestrator::new(Config::default(), Arc::clone(&storage)).unwrap();

    let summary = orchestrator
        .run("run-1", vec![source(&late), source(&good)])
        .await;

    let failed = &summary.files[0];
    assert_eq!(failed.status, FileStatus::Failed);
    let batch = failed.batch.as_ref().unwrap();
    assert_eq!(batch.total, 0);
    assert_eq!(batch.errors[0].kind, IssueKind::SourceFailed);

    assert_eq!(summary.files[1].status, FileStatus::Completed);
    assert_eq!(summary.inserted, 2);
    let amp = storage.get_product("acme", "AMP-1").await.unwrap().unwrap();
    assert_eq!(amp.attributes.cost_price, Some(dec!(1234.5)));

    let progress = storage.get_progress("run-1", "acme.xlsx").await.unwrap().unwrap();
    assert_eq!(progress.status, ProgressStatus::Completed);
    assert_eq!(progress.watermark_row, 7);
}
