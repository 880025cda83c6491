//! Options applied when a document is opened.

pub const READ_ONLY_VAR: &str = "HEXOVERLAY_READ_ONLY";
pub const INSERT_ANYWHERE_VAR: &str = "HEXOVERLAY_INSERT_ANYWHERE";
pub const CHUNK_SIZE_VAR: &str = "HEXOVERLAY_CHUNK_SIZE";

/// How a [`crate::document::Document`] treats its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Refuse every mutation. A file the OS will not let us write is
    /// read-only regardless of this flag.
    pub read_only: bool,
    /// Stored and reported; insertion is still append-only.
    pub allow_insert_anywhere: bool,
    /// Bytes per read for chunked passes (search, compare, commit).
    pub chunk_size: usize,
    /// Minimum percentage change between two long-process progress events.
    pub progress_step: u8,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            allow_insert_anywhere: false,
            chunk_size: hex_core::buffer::DEFAULT_CHUNK_SIZE,
            progress_step: 1,
        }
    }
}

/// Parse a boolean-like environment flag value.
///
/// Truthy: `1`, `true`, `yes`, `on`. Falsy: `0`, `false`, `no`, `off` and
/// the empty string. Case-insensitive, surrounding whitespace ignored.
/// Anything else is `None`.
#[must_use]
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl OpenOptions {
    /// Defaults overridden by `HEXOVERLAY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`OpenOptions::from_env`] with a custom variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |name: &str| {
            lookup(name)
                .and_then(|value| parse_env_flag(&value))
                .unwrap_or(false)
        };

        let chunk_size = match lookup(CHUNK_SIZE_VAR) {
            None => defaults.chunk_size,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    tracing::warn!(var = CHUNK_SIZE_VAR, value = %raw, "invalid chunk size, using default");
                    defaults.chunk_size
                }
            },
        };

        Self {
            read_only: flag(READ_ONLY_VAR),
            allow_insert_anywhere: flag(INSERT_ANYWHERE_VAR),
            chunk_size,
            ..defaults
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}
