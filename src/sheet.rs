//! Spreadsheet reading. xlsx/xls go through calamine (first worksheet only);
//! csv goes through the csv crate.

use crate::error::{ImportError, Result};
use crate::record::{normalize_header, Record};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Xlsx,
    Xls,
    Csv,
}

impl SheetKind {
    pub fn from_name(name: &str) -> Option<SheetKind> {
        let lower = name.trim().to_ascii_lowercase();
        if lower.ends_with(".xlsx") {
            Some(SheetKind::Xlsx)
        } else if lower.ends_with(".xls") {
            Some(SheetKind::Xls)
        } else if lower.ends_with(".csv") {
            Some(SheetKind::Csv)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SheetKind::Xlsx => "xlsx",
            SheetKind::Xls => "xls",
            SheetKind::Csv => "csv",
        }
    }
}

/// Parse a spreadsheet into records, in file order. Blank rows are skipped.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let name = path.to_string_lossy().to_string();
    let kind =
        SheetKind::from_name(&name).ok_or_else(|| ImportError::UnsupportedFileType(name.clone()))?;
    let cells = match kind {
        SheetKind::Csv => read_csv_cells(path),
        SheetKind::Xlsx | SheetKind::Xls => read_workbook_cells(path),
    }
    .map_err(|cause| ImportError::UnreadableFile {
        path: name.clone(),
        cause,
    })?;
    Ok(rows_to_records(cells))
}

fn read_workbook_cells(path: &Path) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| e.to_string())?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| e.to_string())?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        // Whole floats print without ".0", matching how the sheet displays them.
        other => other.to_string(),
    }
}

fn read_csv_cells(path: &Path) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    for rec in reader.records() {
        let rec = rec.map_err(|e| e.to_string())?;
        out.push(rec.iter().map(|s| s.to_string()).collect());
    }
    Ok(out)
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn rows_to_records(cells: Vec<Vec<String>>) -> Vec<Record> {
    let mut rows = cells.into_iter().filter(|r| !is_blank(r));
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let header = header
        .iter()
        .map(|h| normalize_header(h.trim_start_matches('\u{feff}')))
        .collect::<Vec<_>>();

    rows.map(|row| {
        let mut keyed = HashMap::with_capacity(header.len());
        for (i, key) in header.iter().enumerate() {
            if key.is_empty() {
                continue;
            }
            if let Some(v) = row.get(i) {
                // First occurrence wins when a header repeats.
                keyed.entry(key.clone()).or_insert_with(|| v.clone());
            }
        }
        Record::from_row(&keyed)
    })
    .collect()
}
