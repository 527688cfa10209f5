//! Record field extraction.
//!
//! Reads the three fields a reconciliation needs off a changed record and
//! normalizes them. Extraction has no side effects: any failure here aborts
//! the event before the summary is touched.

use super::{NormalizedFields, KIT_FIELD, STATE_FIELD, UPDATED_AT_FIELD};
use crate::core::error::{KitmaxError, KitmaxResult};
use crate::store::RecordReader;
use std::sync::Arc;

/// Extracts [`NormalizedFields`] from records.
#[derive(Clone)]
pub struct Extractor {
    records: Arc<dyn RecordReader>,
}

impl Extractor {
    /// Create an extractor reading from `records`.
    pub fn new(records: Arc<dyn RecordReader>) -> Self {
        Self { records }
    }

    /// Read and normalize the fields of the record at `key`.
    ///
    /// The three reads are issued concurrently. Absent or null fields fail
    /// with `MissingField`; malformed ones with `Parse`.
    pub async fn extract(&self, key: &str) -> KitmaxResult<NormalizedFields> {
        let (kit, state, updated_at) = tokio::try_join!(
            self.records.read_field(key, KIT_FIELD),
            self.records.read_field(key, STATE_FIELD),
            self.records.read_field(key, UPDATED_AT_FIELD),
        )?;

        let kit = kit.ok_or_else(|| KitmaxError::missing_field(key, KIT_FIELD))?;
        let state = state.ok_or_else(|| KitmaxError::missing_field(key, STATE_FIELD))?;
        let updated_at =
            updated_at.ok_or_else(|| KitmaxError::missing_field(key, UPDATED_AT_FIELD))?;

        let group_id = strip_delimiters(&kit)
            .ok_or_else(|| {
                KitmaxError::parse(key, KIT_FIELD, kit.as_str(), "expected a delimited string")
            })?
            .to_string();

        Ok(NormalizedFields {
            group_id,
            state: parse_int(key, STATE_FIELD, &state)?,
            updated_at: parse_int(key, UPDATED_AT_FIELD, &updated_at)?,
        })
    }
}

/// Strip exactly the first and last character.
///
/// Returns `None` when the value has fewer than two characters.
pub fn strip_delimiters(raw: &str) -> Option<&str> {
    let mut chars = raw.char_indices();
    let (_, first) = chars.next()?;
    let (last_start, _) = chars.next_back()?;
    Some(&raw[first.len_utf8()..last_start])
}

fn parse_int(key: &str, field: &str, raw: &str) -> KitmaxResult<i64> {
    raw.parse::<i64>()
        .map_err(|e| KitmaxError::parse(key, field, raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_delimiters() {
        assert_eq!(strip_delimiters("\"abc\""), Some("abc"));
        assert_eq!(strip_delimiters("\"\""), Some(""));
        assert_eq!(strip_delimiters("'é'"), Some("é"));
        assert_eq!(strip_delimiters("\""), None);
        assert_eq!(strip_delimiters(""), None);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("tile:1", "state", "42").unwrap(), 42);
        assert_eq!(parse_int("tile:1", "state", "-7").unwrap(), -7);
        assert!(matches!(
            parse_int("tile:1", "state", "abc"),
            Err(KitmaxError::Parse { .. })
        ));
        assert!(parse_int("tile:1", "state", "1.5").is_err());
        assert!(parse_int("tile:1", "state", "\"5\"").is_err());
    }
}
