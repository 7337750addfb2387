//! Opaque pagination cursor.
//!
//! A cursor is the URL-safe base64 of the timestamp's microseconds since the
//! Unix epoch, written in decimal. That covers every instant chrono can
//! represent, including years outside 1..=9999. Only the canonical encoding
//! decodes, so each cursor string maps to exactly one timestamp and back.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Opaque continuation token. An empty cursor means "start of the sequence".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// The "no cursor" value.
    pub fn start() -> Self {
        Self(String::new())
    }

    /// Encode a timestamp. Sub-microsecond digits are dropped.
    pub fn encode(t: DateTime<Utc>) -> Self {
        let micros = t.timestamp_micros().to_string();
        Self(URL_SAFE_NO_PAD.encode(micros.as_bytes()))
    }

    /// Decode into a timestamp; `Ok(None)` for the empty cursor.
    pub fn decode(&self) -> Result<Option<DateTime<Utc>>, WalletError> {
        decode(&self.0)
    }

    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl core::fmt::Display for Cursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode a raw cursor string.
pub fn decode(raw: &str) -> Result<Option<DateTime<Utc>>, WalletError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(raw.as_bytes())
        .map_err(|e| WalletError::bad_cursor(format!("not base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| WalletError::bad_cursor("not utf-8"))?;
    let micros: i64 = text
        .parse()
        .map_err(|e| WalletError::bad_cursor(format!("not a timestamp: {e}")))?;
    let t = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| WalletError::bad_cursor("timestamp out of range"))?;

    if Cursor::encode(t).as_str() != raw {
        return Err(WalletError::bad_cursor("non-canonical cursor"));
    }

    Ok(Some(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn empty_cursor_means_start() {
        assert_eq!(Cursor::start().decode().unwrap(), None);
        assert_eq!(decode("").unwrap(), None);
    }

    #[test]
    fn garbage_is_bad_cursor() {
        for raw in ["12", "%%%", "bm90IGEgdGltZQ"] {
            match decode(raw) {
                Err(WalletError::BadCursor(_)) => {}
                other => panic!("expected BadCursor for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_canonical_timestamp_is_rejected() {
        // Same instant as "1704067200000000", spelled differently.
        for text in ["01704067200000000", "+1704067200000000", " 1704067200000000"] {
            let raw = URL_SAFE_NO_PAD.encode(text);
            assert!(matches!(decode(&raw), Err(WalletError::BadCursor(_))), "{text:?}");
        }
        let canonical = URL_SAFE_NO_PAD.encode("1704067200000000");
        assert!(decode(&canonical).unwrap().is_some());
    }

    #[test]
    fn out_of_range_micros_are_bad_cursor() {
        let raw = URL_SAFE_NO_PAD.encode(i64::MAX.to_string());
        assert!(matches!(decode(&raw), Err(WalletError::BadCursor(_))));
    }

    #[test]
    fn years_past_9999_round_trip() {
        let t = DateTime::<Utc>::from_timestamp_micros(253_402_300_800_000_000).unwrap();
        assert_eq!(Cursor::encode(t).decode().unwrap(), Some(t));

        let max_micros = DateTime::<Utc>::MAX_UTC.timestamp_micros();
        let max = DateTime::<Utc>::from_timestamp_micros(max_micros).unwrap();
        for t in [DateTime::<Utc>::MIN_UTC, max] {
            assert_eq!(Cursor::encode(t).decode().unwrap(), Some(t));
        }
    }

    #[test]
    fn sub_microsecond_digits_are_dropped() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::TimeDelta::nanoseconds(1_500);
        let decoded = Cursor::encode(t).decode().unwrap().unwrap();
        assert_eq!(decoded, crate::clock::truncate(t));
    }

    #[test]
    fn cursors_sort_with_their_timestamps() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::TimeDelta::microseconds(1);
        let (da, db) = (
            Cursor::encode(a).decode().unwrap().unwrap(),
            Cursor::encode(b).decode().unwrap().unwrap(),
        );
        assert!(da < db);
    }

    proptest! {
        /// Property: decode(encode(t)) == t for any timestamp at store precision.
        #[test]
        fn decode_inverts_encode(
            micros in DateTime::<Utc>::MIN_UTC.timestamp_micros()..=DateTime::<Utc>::MAX_UTC.timestamp_micros()
        ) {
            let t = DateTime::<Utc>::from_timestamp_micros(micros).unwrap();
            prop_assert_eq!(Cursor::encode(t).decode().unwrap(), Some(t));
        }
    }
}
