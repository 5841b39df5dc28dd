// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CSV Blob Access
//!
//! Blocking CSV primitives over blobs in the store: structural validation,
//! the planner's single-pass chunk scan, and the executor's
//! read-at-offset. All three run on tokio's blocking-I/O pool via
//! `spawn_blocking`; nothing here may be called from the scheduler thread.
//!
//! ## Offset contract
//!
//! The scan records, for every chunk, the byte position of its first row
//! (`start_cookie`). The position is taken from the parser immediately
//! **before** the row is read, so seeking back to it and re-parsing yields
//! exactly the same row. This is what makes chunk execution idempotent:
//! a retried chunk re-reads the same `(start_cookie, num_rows)` window and
//! produces the same records.
//!
//! ## Dialect
//!
//! RFC 4180, comma delimiter, LF or CRLF line endings, UTF-8. Quoted
//! fields may contain embedded newlines; offsets always point at record
//! starts, never into the middle of a quoted field. The header row is
//! consumed as the column schema and is never part of a chunk.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use granary_domain::{ChunkSize, IngestError};

/// Shape summary from a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvStructure {
    /// Column count established by the header row
    pub columns: usize,
    /// Number of data rows (header excluded)
    pub data_rows: u64,
}

/// One planned chunk: dense index plus read coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedChunk {
    pub index: u32,
    pub start_cookie: u64,
    pub num_rows: u32,
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, IngestError> {
    let file = File::open(path)?;
    Ok(reader_builder().from_reader(file))
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    // Header handling is ours: the first record is read explicitly as the
    // schema row, and ragged rows are diagnosed with row numbers instead of
    // the parser's own error.
    builder.has_headers(false).flexible(true);
    builder
}

fn parse_error(path: &Path, err: csv::Error) -> IngestError {
    match err.kind() {
        csv::ErrorKind::Io(_) => IngestError::Io(format!(
            "Failed reading CSV blob {}: {}",
            path.display(),
            err
        )),
        _ => IngestError::CsvStructural(format!("{}", err)),
    }
}

/// Validates the structure of a CSV blob and counts its data rows.
///
/// Checks performed:
/// - the file has a non-empty header row
/// - every data row has exactly as many columns as the header
///
/// # Errors
///
/// - `IngestError::BlobMissing` when the blob does not exist
/// - `IngestError::CsvStructural` for an empty file, an empty header, a
///   ragged row (with its 1-based row number), or malformed CSV
pub fn validate_structure(path: &Path) -> Result<CsvStructure, IngestError> {
    let mut reader = open_reader(path)?;
    let mut record = csv::StringRecord::new();

    if !reader.read_record(&mut record).map_err(|e| parse_error(path, e))? {
        return Err(IngestError::CsvStructural("Empty file".to_string()));
    }
    let columns = record.len();
    if columns == 0 || (columns == 1 && record.get(0).unwrap_or("").is_empty()) {
        return Err(IngestError::CsvStructural("No headers found".to_string()));
    }

    let mut data_rows: u64 = 0;
    // Row numbers are 1-based and include the header, matching what a user
    // sees in a spreadsheet.
    let mut row_number: u64 = 1;
    while reader.read_record(&mut record).map_err(|e| parse_error(path, e))? {
        row_number += 1;
        if record.len() != columns {
            return Err(IngestError::CsvStructural(format!(
                "Row {} has {} columns, expected {}",
                row_number,
                record.len(),
                columns
            )));
        }
        data_rows += 1;
    }

    Ok(CsvStructure { columns, data_rows })
}

/// Single-pass chunk scan: carves the blob's data rows into chunks of up
/// to `chunk_size` rows, each anchored to the byte offset of its first
/// row.
///
/// The header row is consumed first and never appears in a chunk; chunk
/// indices are dense, 0-based and follow row order. The final chunk holds
/// the tail (`1..=chunk_size` rows). An empty data section yields an empty
/// plan.
pub fn plan_chunks(path: &Path, chunk_size: ChunkSize) -> Result<Vec<PlannedChunk>, IngestError> {
    let mut reader = open_reader(path)?;
    let mut record = csv::StringRecord::new();

    // Header row: schema only.
    if !reader.read_record(&mut record).map_err(|e| parse_error(path, e))? {
        return Ok(Vec::new());
    }

    let mut plan = Vec::new();
    let mut index: u32 = 0;
    let mut rows_in_chunk: u32 = 0;
    let mut chunk_start: u64 = 0;

    loop {
        // Position of the record about to be read; becomes the chunk's
        // start_cookie when the record opens a new chunk.
        let cookie = reader.position().byte();
        if !reader.read_record(&mut record).map_err(|e| parse_error(path, e))? {
            break;
        }

        if rows_in_chunk == 0 {
            chunk_start = cookie;
        }
        rows_in_chunk += 1;

        if rows_in_chunk == chunk_size.rows() {
            plan.push(PlannedChunk {
                index,
                start_cookie: chunk_start,
                num_rows: rows_in_chunk,
            });
            index += 1;
            rows_in_chunk = 0;
        }
    }

    if rows_in_chunk > 0 {
        plan.push(PlannedChunk {
            index,
            start_cookie: chunk_start,
            num_rows: rows_in_chunk,
        });
    }

    Ok(plan)
}

/// Reads up to `num_rows` rows starting at `start_cookie`.
///
/// Returns the rows as field vectors in file order. Fewer rows than
/// requested are returned at end of file; rows past the requested count
/// are never consumed.
pub fn read_rows_at(
    path: &Path,
    start_cookie: u64,
    num_rows: u32,
) -> Result<Vec<Vec<String>>, IngestError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start_cookie))?;
    let mut reader = reader_builder().from_reader(file);

    let mut rows = Vec::with_capacity(num_rows as usize);
    let mut record = csv::StringRecord::new();
    for _ in 0..num_rows {
        if !reader.read_record(&mut record).map_err(|e| parse_error(path, e))? {
            break;
        }
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }

    Ok(rows)
}
