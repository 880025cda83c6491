/// How copied bytes are turned into text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CopyMode {
    #[default]
    HexString,
    AsciiString,
}

/// Upper-case hex pairs joined by `separator`.
#[must_use]
pub fn to_hex_string(bytes: &[u8], separator: &str) -> String {
    if separator.is_empty() {
        return hex::encode_upper(bytes);
    }

    bytes
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Printable ASCII as is, everything else as `.`.
#[must_use]
pub fn to_ascii_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| {
            if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            }
        })
        .collect()
}

/// Renders `bytes` the way `mode` asks for.
#[must_use]
pub fn format_bytes(bytes: &[u8], mode: CopyMode) -> String {
    match mode {
        CopyMode::HexString => to_hex_string(bytes, " "),
        CopyMode::AsciiString => to_ascii_string(bytes),
    }
}

/// Parses text like `"AA BB"`, `"0xAA 0xBB"` or `"aabb"`.
///
/// Tokens are split on whitespace and each must hold an even number of hex
/// digits after an optional `0x`. Returns `None` for empty input or when any
/// token is not hex.
#[must_use]
pub fn parse_hex_string(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::new();

    for token in text.split_whitespace() {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);

        if digits.is_empty() {
            return None;
        }

        out.extend(hex::decode(digits).ok()?);
    }

    (!out.is_empty()).then_some(out)
}

/// Exactly one byte written as hex, e.g. `"1F"` or `"0x1F"`.
#[must_use]
pub fn parse_byte(text: &str) -> Option<u8> {
    match parse_hex_string(text)?.as_slice() {
        [byte] => Some(*byte),
        _ => None,
    }
}
