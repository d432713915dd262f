//! Date pattern translation.
//!
//! Time formats are configured with the familiar letter patterns
//! (`yyyy-MM-dd'T'HH:mm:ss'Z'`): runs of pattern letters are fields, text in single
//! quotes is literal and `''` is a quote. The pattern is translated once into a chrono
//! format string which is then used for every cell.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{Result, TrajloadError};

/// Default pattern for the `time` column
pub const DEFAULT_TIME_FORMAT: &str = "yyyy-MM-dd'T'HH:mm:ss'Z'";

const TOKEN_PATTERN: &str = r"'(?:[^']|'')*'|y+|M+|d+|D+|H+|h+|m+|s+|S+|a+|E+|X+|Z+|[A-Za-z]+|.";

/// A translated date pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormat {
    pattern: String,
    chrono_format: String,
    has_zone: bool,
    has_time: bool,
}

impl TimeFormat {
    /// Translate a letter pattern into a chrono format
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(TrajloadError::Config("time format must not be empty".to_string()));
        }

        let tokenizer = Regex::new(TOKEN_PATTERN)
            .map_err(|e| TrajloadError::Config(format!("time format tokenizer: {}", e)))?;

        let mut chrono_format = String::new();
        let mut has_zone = false;
        let mut has_time = false;

        for token in tokenizer.find_iter(pattern) {
            let token = token.as_str();
            let first = token.chars().next().unwrap_or_default();
            let len = token.chars().count();

            match first {
                '\'' if len >= 2 => {
                    let literal = if token == "''" {
                        "'".to_string()
                    } else {
                        token[1..token.len() - 1].replace("''", "'")
                    };
                    chrono_format.push_str(&escape_literal(&literal));
                }
                'y' if len == 2 => chrono_format.push_str("%y"),
                'y' => chrono_format.push_str("%Y"),
                'M' if len <= 2 => chrono_format.push_str("%m"),
                'M' if len == 3 => chrono_format.push_str("%b"),
                'M' => chrono_format.push_str("%B"),
                'd' => chrono_format.push_str("%d"),
                'D' => chrono_format.push_str("%j"),
                'E' if len <= 3 => chrono_format.push_str("%a"),
                'E' => chrono_format.push_str("%A"),
                'H' | 'h' | 'm' | 's' | 'S' | 'a' => {
                    has_time = true;
                    chrono_format.push_str(match first {
                        'H' => "%H",
                        'h' => "%I",
                        'm' => "%M",
                        's' => "%S",
                        'S' => "%3f",
                        _ => "%p",
                    });
                }
                'X' if len >= 3 => {
                    has_zone = true;
                    chrono_format.push_str("%:z");
                }
                'X' | 'Z' => {
                    has_zone = true;
                    chrono_format.push_str("%z");
                }
                c if c.is_ascii_alphabetic() => {
                    return Err(TrajloadError::Config(format!(
                        "unsupported field '{}' in time format '{}'",
                        token, pattern
                    )));
                }
                _ => chrono_format.push_str(&escape_literal(token)),
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            chrono_format,
            has_zone,
            has_time,
        })
    }

    /// The pattern as configured
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The translated chrono format string
    pub fn chrono_format(&self) -> &str {
        &self.chrono_format
    }

    /// Parse one cell. Patterns without a zone are read as UTC; date-only
    /// patterns resolve to midnight.
    pub fn parse(&self, value: &str) -> std::result::Result<DateTime<Utc>, String> {
        let value = value.trim();

        if self.has_zone {
            return DateTime::parse_from_str(value, &self.chrono_format)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| self.parse_error(value, e));
        }

        if self.has_time {
            return NaiveDateTime::parse_from_str(value, &self.chrono_format)
                .map(|dt| dt.and_utc())
                .map_err(|e| self.parse_error(value, e));
        }

        let date = NaiveDate::parse_from_str(value, &self.chrono_format)
            .map_err(|e| self.parse_error(value, e))?;
        date.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("'{}' has no valid midnight", value))
    }

    fn parse_error(&self, value: &str, e: chrono::ParseError) -> String {
        format!("'{}' does not match time format '{}': {}", value, self.pattern, e)
    }
}

impl Default for TimeFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_TIME_FORMAT.to_string(),
            chrono_format: "%Y-%m-%dT%H:%M:%SZ".to_string(),
            has_zone: false,
            has_time: true,
        }
    }
}

fn escape_literal(literal: &str) -> String {
    literal.replace('%', "%%")
}
