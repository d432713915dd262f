use std::collections::HashMap;

use crate::error::{Result, TrajloadError};

use super::time_format::TimeFormat;

pub const USERID: &str = "userid";
pub const TIME: &str = "time";
pub const LATITUDE: &str = "lat";
pub const LONGITUDE: &str = "lon";

/// Role of one header column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    EntityId,
    Timestamp,
    Latitude,
    Longitude,
    Annotation(String),
}

impl ColumnKind {
    /// Classify a header cell, ignoring case and surrounding whitespace
    pub fn classify(header: &str) -> Self {
        let name = header.trim();
        if name.eq_ignore_ascii_case(USERID) {
            ColumnKind::EntityId
        } else if name.eq_ignore_ascii_case(TIME) {
            ColumnKind::Timestamp
        } else if name.eq_ignore_ascii_case(LATITUDE) {
            ColumnKind::Latitude
        } else if name.eq_ignore_ascii_case(LONGITUDE) {
            ColumnKind::Longitude
        } else {
            ColumnKind::Annotation(name.to_string())
        }
    }

    /// Mandatory columns reject blank cells
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, ColumnKind::Annotation(_))
    }
}

/// Header-derived decode plan for one file.
///
/// Built once per file and passed to the row decoder as data.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub columns: Vec<ColumnKind>,
    pub entity_idx: Option<usize>,
    pub time_idx: usize,
    pub lat_idx: usize,
    pub lon_idx: usize,
    /// Annotation name -> column index
    pub annotation_idx: HashMap<String, usize>,
    pub time_format: TimeFormat,
}

impl RecordSchema {
    /// Resolve the header of a file.
    ///
    /// Fails with [`TrajloadError::MissingHeaderAttribute`] naming every absent
    /// mandatory column. When a column name repeats, the last occurrence wins.
    pub fn resolve<'a, I>(headers: I, time_format: &TimeFormat) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut columns = Vec::new();
        let mut entity_idx = None;
        let mut time_idx = None;
        let mut lat_idx = None;
        let mut lon_idx = None;
        let mut annotation_idx = HashMap::new();

        for (i, header) in headers.into_iter().enumerate() {
            let kind = ColumnKind::classify(header);
            match &kind {
                ColumnKind::EntityId => entity_idx = Some(i),
                ColumnKind::Timestamp => time_idx = Some(i),
                ColumnKind::Latitude => lat_idx = Some(i),
                ColumnKind::Longitude => lon_idx = Some(i),
                ColumnKind::Annotation(name) => {
                    annotation_idx.insert(name.clone(), i);
                }
            }
            columns.push(kind);
        }

        let mut missing = Vec::new();
        if lat_idx.is_none() {
            missing.push(LATITUDE);
        }
        if lon_idx.is_none() {
            missing.push(LONGITUDE);
        }
        if time_idx.is_none() {
            missing.push(TIME);
        }

        match (time_idx, lat_idx, lon_idx) {
            (Some(time_idx), Some(lat_idx), Some(lon_idx)) => Ok(Self {
                columns,
                entity_idx,
                time_idx,
                lat_idx,
                lon_idx,
                annotation_idx,
                time_format: time_format.clone(),
            }),
            _ => Err(TrajloadError::MissingHeaderAttribute(missing.join(","))),
        }
    }

    /// Whether the file declares an entity column (entity-id mode)
    pub fn has_entity_id(&self) -> bool {
        self.entity_idx.is_some()
    }

    /// Name of the column at `idx`, for error messages
    pub fn column_name(&self, idx: usize) -> &str {
        match self.columns.get(idx) {
            Some(ColumnKind::EntityId) => USERID,
            Some(ColumnKind::Timestamp) => TIME,
            Some(ColumnKind::Latitude) => LATITUDE,
            Some(ColumnKind::Longitude) => LONGITUDE,
            Some(ColumnKind::Annotation(name)) => name,
            None => "?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(headers: &[&str]) -> Result<RecordSchema> {
        RecordSchema::resolve(headers.iter().copied(), &TimeFormat::default())
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(ColumnKind::classify("UserId"), ColumnKind::EntityId);
        assert_eq!(ColumnKind::classify(" TIME "), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::classify("Lat"), ColumnKind::Latitude);
        assert_eq!(ColumnKind::classify("LON"), ColumnKind::Longitude);
        assert_eq!(
            ColumnKind::classify("Speed"),
            ColumnKind::Annotation("Speed".to_string())
        );
        assert!(!ColumnKind::classify("speed").is_mandatory());
        assert!(ColumnKind::classify("userid").is_mandatory());
    }

    #[test]
    fn test_resolve_any_order() {
        let schema = resolve(&["lon", "speed", "TIME", "lat"]).unwrap();
        assert_eq!(schema.lon_idx, 0);
        assert_eq!(schema.time_idx, 2);
        assert_eq!(schema.lat_idx, 3);
        assert_eq!(schema.annotation_idx.get("speed"), Some(&1));
        assert!(!schema.has_entity_id());
    }

    #[test]
    fn test_resolve_with_entity_column() {
        let schema = resolve(&["userid", "time", "lat", "lon"]).unwrap();
        assert!(schema.has_entity_id());
        assert_eq!(schema.entity_idx, Some(0));
        assert!(schema.annotation_idx.is_empty());
        assert_eq!(schema.column_name(0), "userid");
    }

    #[test]
    fn test_missing_lat_is_named() {
        let err = resolve(&["time", "lon", "speed"]).unwrap_err();
        match err {
            TrajloadError::MissingHeaderAttribute(cols) => assert_eq!(cols, "lat"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_every_missing_column_is_listed() {
        let err = resolve(&["userid", "speed"]).unwrap_err();
        assert_eq!(err.to_string(), "Missing header attributes: lat,lon,time");
    }

    #[test]
    fn test_duplicate_column_last_wins() {
        let schema = resolve(&["time", "lat", "lon", "lat"]).unwrap();
        assert_eq!(schema.lat_idx, 3);
    }
}
