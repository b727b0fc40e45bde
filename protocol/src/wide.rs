//! UTF-16 helpers. Registry names travel as counted UTF-16 strings.

/// Path component separator.
pub const SEPARATOR: u16 = b'\\' as u16;

/// Encode `s` as UTF-16 without a terminator.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Decode UTF-16, replacing unpaired surrogates with U+FFFD.
pub fn from_wide_lossy(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}
