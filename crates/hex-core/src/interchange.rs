//! Session interchange document.
//!
//! A saved session holds the selection, the read-only flag, the pending
//! edits split by action and the bookmarks. It is written as JSON:
//!
//! ```json
//! {
//!   "version": "0.1",
//!   "selection_start": 4,
//!   "selection_stop": 9,
//!   "first_visible_position": 0,
//!   "read_only": false,
//!   "modified": [{ "position": 1, "value": "FF" }],
//!   "deleted": [3],
//!   "added": [{ "position": 12, "value": "0A" }],
//!   "bookmarks": [{ "position": 0, "description": "header" }]
//! }
//! ```
//!
//! Reading is forgiving. A field that is missing or malformed falls back to
//! its default and a bad entry in one of the lists is skipped, both with a
//! warning, so one corrupt value never loses the rest of the session.

pub const FORMAT_VERSION: &str = "0.1";

/// Byte values travel as two hex digits.
mod hex_byte {
    pub fn serialize<S: serde::Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:02X}"))
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let text: String = serde::Deserialize::deserialize(deserializer)?;

        crate::hexfmt::parse_byte(&text)
            .ok_or_else(|| serde::de::Error::custom("expected a hex byte"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ByteEntry {
    pub position: u64,
    #[serde(with = "hex_byte")]
    pub value: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BookmarkEntry {
    pub position: u64,
    pub description: String,
}

/// Everything needed to resume an editing session over the same source.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionState {
    pub version: String,
    pub selection_start: u64,
    pub selection_stop: u64,
    pub first_visible_position: u64,
    pub read_only: bool,
    pub modified: Vec<ByteEntry>,
    pub deleted: Vec<u64>,
    pub added: Vec<ByteEntry>,
    pub bookmarks: Vec<BookmarkEntry>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_owned(),
            selection_start: 0,
            selection_stop: 0,
            first_visible_position: 0,
            read_only: false,
            modified: Vec::new(),
            deleted: Vec::new(),
            added: Vec::new(),
            bookmarks: Vec::new(),
        }
    }
}

impl SessionState {
    /// Fills the three edit lists from `overlay`, each ordered by position.
    pub fn capture_edits(&mut self, overlay: &crate::overlay::OverlayStore) {
        use crate::enums::ByteAction;

        self.modified.clear();
        self.deleted.clear();
        self.added.clear();

        for record in overlay.all_by_action(crate::enums::ActionFilter::All) {
            match (record.action, record.value) {
                (ByteAction::Modified, Some(value)) => self.modified.push(ByteEntry {
                    position: record.position,
                    value,
                }),
                (ByteAction::Added, Some(value)) => self.added.push(ByteEntry {
                    position: record.position,
                    value,
                }),
                (ByteAction::Deleted, _) => self.deleted.push(record.position),
                _ => {}
            }
        }
    }

    /// The edit records this session describes: modifications, then
    /// deletions, then appended bytes.
    #[must_use]
    pub fn records(&self) -> Vec<crate::enums::EditRecord> {
        use crate::enums::EditRecord;

        self.modified
            .iter()
            .map(|entry| EditRecord::modified(entry.position, entry.value))
            .chain(self.deleted.iter().map(|&position| EditRecord::deleted(position)))
            .chain(
                self.added
                    .iter()
                    .map(|entry| EditRecord::added(entry.position, entry.value)),
            )
            .collect()
    }

    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Json`] if serialization fails.
    pub fn to_json(&self) -> crate::errors::OverlayResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Best-effort parse. Only text that is not JSON at all is an error.
    ///
    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Json`] if `text` is not valid JSON.
    pub fn from_json(text: &str) -> crate::errors::OverlayResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        Ok(Self::from_value(&value))
    }

    /// Builds a session field by field, defaulting whatever cannot be read.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        let Some(object) = value.as_object() else {
            tracing::warn!("session document is not an object, using defaults");
            return Self::default();
        };

        let version = match object.get("version").and_then(serde_json::Value::as_str) {
            Some(version) => version.to_owned(),
            None => {
                tracing::warn!(
                    version = FORMAT_VERSION,
                    "session document has no version, assuming current"
                );
                FORMAT_VERSION.to_owned()
            }
        };

        Self {
            version,
            selection_start: number_field(object, "selection_start"),
            selection_stop: number_field(object, "selection_stop"),
            first_visible_position: number_field(object, "first_visible_position"),
            read_only: bool_field(object, "read_only"),
            modified: list_field(object, "modified", byte_entry),
            deleted: list_field(object, "deleted", as_number),
            added: list_field(object, "added", byte_entry),
            bookmarks: list_field(object, "bookmarks", bookmark_entry),
        }
    }

    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the file cannot be written.
    /// - [`crate::errors::OverlayError::Json`] if serialization fails.
    pub fn write_to(&self, path: &std::path::Path) -> crate::errors::OverlayResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the file cannot be read.
    /// - [`crate::errors::OverlayError::Json`] if it is not JSON.
    pub fn read_from(path: &std::path::Path) -> crate::errors::OverlayResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

type JsonObject = serde_json::Map<String, serde_json::Value>;

fn as_number(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
}

fn as_byte(value: &serde_json::Value) -> Option<u8> {
    match value {
        serde_json::Value::String(text) => crate::hexfmt::parse_byte(text),
        serde_json::Value::Number(_) => value.as_u64().and_then(|n| u8::try_from(n).ok()),
        _ => None,
    }
}

fn number_field(object: &JsonObject, name: &str) -> u64 {
    match object.get(name) {
        None => 0,
        Some(value) => as_number(value).unwrap_or_else(|| {
            tracing::warn!(field = name, %value, "unreadable number, using 0");
            0
        }),
    }
}

fn bool_field(object: &JsonObject, name: &str) -> bool {
    match object.get(name) {
        None => false,
        Some(serde_json::Value::Bool(flag)) => *flag,
        Some(serde_json::Value::String(text)) => match text.trim() {
            "true" | "True" => true,
            "false" | "False" => false,
            _ => {
                tracing::warn!(field = name, text = %text, "unreadable flag, using false");
                false
            }
        },
        Some(value) => {
            tracing::warn!(field = name, %value, "unreadable flag, using false");
            false
        }
    }
}

fn list_field<T>(
    object: &JsonObject,
    name: &str,
    parse: impl Fn(&serde_json::Value) -> Option<T>,
) -> Vec<T> {
    let Some(value) = object.get(name) else {
        return Vec::new();
    };

    let Some(items) = value.as_array() else {
        tracing::warn!(field = name, "expected a list, ignoring");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let parsed = parse(item);
            if parsed.is_none() {
                tracing::warn!(field = name, index, %item, "skipping unreadable entry");
            }
            parsed
        })
        .collect()
}

fn byte_entry(value: &serde_json::Value) -> Option<ByteEntry> {
    Some(ByteEntry {
        position: as_number(value.get("position")?)?,
        value: as_byte(value.get("value")?)?,
    })
}

fn bookmark_entry(value: &serde_json::Value) -> Option<BookmarkEntry> {
    Some(BookmarkEntry {
        position: as_number(value.get("position")?)?,
        description: value
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    })
}
