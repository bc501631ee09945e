//! Typed page-content schema and the normalization passes that prepare a
//! draft payload for permanent storage.
//!
//! The builder UI evolves independently of the server, so a draft's content
//! arrives as free-form JSON. The fields the server interprets (plan tier,
//! media slots, dated timeline entries) are extracted into [`PageContent`];
//! everything else passes through untouched in [`PageContent::extra`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::plan::PlanTier;

/// Storage-location prefix of the temporary, per-user media area.
pub const TEMP_MARKER: &str = "temp/";

/// Root of the permanent, per-page media area.
pub const PERM_ROOT: &str = "perm";

/// Nested passthrough content deeper than this normalizes to null.
const MAX_DOCUMENT_DEPTH: usize = 32;

/// A media attachment: a publicly resolvable `url` plus the storage key
/// `path` it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaRef {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path: String,
}

impl MediaRef {
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }

    /// A reference still living in the temporary area must be promoted
    /// before the page it belongs to goes public.
    pub fn is_temporary(&self) -> bool {
        self.path.contains(TEMP_MARKER)
    }
}

/// Canonical stored timestamp: whole seconds since the epoch plus
/// sub-second nanos. This is the only date shape the document store sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }

    pub fn now() -> Self {
        Self::from_datetime(chrono::Utc::now())
    }
}

/// Lenient timestamp extraction, used during deserialization and by the
/// sanitize walk. Tolerates:
///
/// - the canonical `{seconds, nanos}` object,
/// - an RFC 3339 string or a plain `YYYY-MM-DD` date string,
/// - an epoch number (seconds, or milliseconds when implausibly large).
///
/// Anything else becomes `None` rather than an error — an unparseable date
/// in a draft must never block finalization.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map.get("nanos").and_then(Value::as_u64).unwrap_or(0) as u32;
            Some(Timestamp { seconds, nanos })
        }
        Value::String(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Some(Timestamp::from_datetime(dt.with_timezone(&chrono::Utc)));
            }
            let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            let dt = date.and_hms_opt(0, 0, 0)?.and_utc();
            Some(Timestamp::from_datetime(dt))
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Epoch milliseconds if the value is far beyond any plausible
            // second count (year ~5138).
            let seconds = if raw.abs() >= 100_000_000_000 {
                raw / 1000
            } else {
                raw
            };
            Some(Timestamp { seconds, nanos: 0 })
        }
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value))
}

fn lenient_plan<'de, D>(deserializer: D) -> Result<PlanTier, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// A dated entry in the page's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineEvent {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub date: Option<Timestamp>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub media: Option<MediaRef>,
}

/// The content schema of a page as the server understands it.
///
/// Every field is optional or defaulted: extraction from a draft payload is
/// total. Unknown builder fields are preserved in `extra` and stored
/// verbatim (after the sanitize walk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PageContent {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(deserialize_with = "lenient_plan")]
    pub plan: PlanTier,
    pub cover: Option<MediaRef>,
    pub gallery: Vec<MediaRef>,
    pub timeline: Vec<TimelineEvent>,
    pub voice_recording: Option<MediaRef>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub special_date: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Draft-record bookkeeping keys that must not leak into the stored page
/// document.
const EXCLUDED_KEYS: &[&str] = &["paymentId", "status", "lovePageId", "ownerId"];

impl PageContent {
    /// Extract the typed content from a raw draft payload. Total: a payload
    /// the schema cannot read at all yields the default (empty) content.
    pub fn from_value(value: &Value) -> PageContent {
        match serde_json::from_value(value.clone()) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "draft payload did not match content schema, using empty content");
                PageContent::default()
            }
        }
    }

    /// Every media reference attached to the content, in slot order.
    pub fn media_refs(&self) -> Vec<&MediaRef> {
        let mut refs = Vec::new();
        refs.extend(self.cover.iter());
        refs.extend(self.gallery.iter());
        refs.extend(self.timeline.iter().filter_map(|e| e.media.as_ref()));
        refs.extend(self.voice_recording.iter());
        refs
    }

    /// Build the normalized document written to the permanent page record.
    ///
    /// Absent optional fields become explicit JSON nulls, array order is
    /// preserved, date fields are already canonical [`Timestamp`] objects,
    /// and payment bookkeeping keys are stripped from passthrough content.
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut doc = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = doc {
            for key in EXCLUDED_KEYS {
                map.remove(*key);
            }
        }
        Ok(sanitize(doc))
    }
}

/// Make a value safe for the document store.
///
/// Total over any JSON value: rebuilds objects and arrays recursively
/// (array order preserved), passes scalars and canonical timestamps through
/// untouched, and replaces content nested beyond a fixed depth cap with
/// null so the destination store can never reject the document.
pub fn sanitize(value: Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: Value, depth: usize) -> Value {
    if depth > MAX_DOCUMENT_DEPTH {
        return Value::Null;
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_at(v, depth + 1)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| sanitize_at(v, depth + 1))
                .collect(),
        ),
        scalar => scalar,
    }
}
