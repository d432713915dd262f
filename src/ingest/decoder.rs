use std::borrow::Cow;

use chrono::{DateTime, Utc};
use csv::ByteRecord;

use crate::error::{Result, TrajloadError};
use crate::model::{AnnotationValue, Annotations, Coordinate, Fix};

use super::schema::{ColumnKind, RecordSchema};

/// Decode one data row into a [`Fix`].
///
/// Every column is checked in order. A blank mandatory cell, or a time / coordinate
/// that does not parse, fails the row. Missing trailing cells count as blank.
/// Annotation cells are kept verbatim as strings and skipped when blank; bytes that
/// are not UTF-8 are replaced there. Mandatory cells must be valid UTF-8.
pub fn decode_row(record: &ByteRecord, line: u64, schema: &RecordSchema) -> Result<Fix> {
    let mut entity_id = None;
    let mut timestamp: Option<DateTime<Utc>> = None;
    let mut lat = None;
    let mut lon = None;
    let mut annotations = Annotations::new();

    for (idx, kind) in schema.columns.iter().enumerate() {
        let raw = record.get(idx).unwrap_or(b"");
        let cell = if kind.is_mandatory() {
            Cow::Borrowed(
                std::str::from_utf8(raw)
                    .map_err(|_| row_error(line, schema, idx, "value is not valid UTF-8"))?,
            )
        } else {
            String::from_utf8_lossy(raw)
        };
        let blank = cell.trim().is_empty();

        if kind.is_mandatory() && blank {
            return Err(row_error(line, schema, idx, "missing mandatory value"));
        }

        match kind {
            ColumnKind::EntityId => {
                if Some(idx) == schema.entity_idx {
                    entity_id = Some(cell.trim().to_string());
                }
            }
            ColumnKind::Timestamp => {
                let parsed = schema
                    .time_format
                    .parse(&cell)
                    .map_err(|reason| row_error(line, schema, idx, &reason))?;
                if idx == schema.time_idx {
                    timestamp = Some(parsed);
                }
            }
            ColumnKind::Latitude | ColumnKind::Longitude => {
                let value = parse_double(&cell)
                    .map_err(|reason| row_error(line, schema, idx, &reason))?;
                if idx == schema.lat_idx {
                    lat = Some(value);
                } else if idx == schema.lon_idx {
                    lon = Some(value);
                }
            }
            ColumnKind::Annotation(name) => {
                if !blank && schema.annotation_idx.get(name) == Some(&idx) {
                    annotations.insert(name.clone(), AnnotationValue::string(cell.into_owned()));
                }
            }
        }
    }

    // Resolved indices always point at mandatory columns checked above
    let (Some(timestamp), Some(lat), Some(lon)) = (timestamp, lat, lon) else {
        return Err(TrajloadError::RowDecode {
            line,
            column: String::new(),
            reason: "row is missing time or position".to_string(),
        });
    };

    Ok(Fix {
        entity_id,
        timestamp,
        coordinate: Coordinate::new(lon, lat),
        annotations,
    })
}

fn parse_double(cell: &str) -> std::result::Result<f64, String> {
    let value: f64 = cell
        .trim()
        .parse()
        .map_err(|_| format!("'{}' could not be parsed as a Double", cell))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{}' is not a finite number", cell))
    }
}

fn row_error(line: u64, schema: &RecordSchema, idx: usize, reason: &str) -> TrajloadError {
    TrajloadError::RowDecode {
        line,
        column: schema.column_name(idx).to_string(),
        reason: reason.to_string(),
    }
}
