pub mod chunk;
pub mod ms3d;
pub mod tds;

/// Decodes a NUL-padded fixed-width name field.
pub fn from_fixed_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encodes a name into a NUL-padded fixed-width field, truncating if needed.
/// The final byte is always NUL.
pub fn to_fixed_name<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = name.len().min(N.saturating_sub(1));
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_name_stops_at_nul() {
        let mut bytes = [0u8; 8];
        bytes[..3].copy_from_slice(b"arm");
        bytes[4] = b'x';
        assert_eq!(from_fixed_name(&bytes), "arm");
    }

    #[test]
    fn fixed_name_keeps_terminator() {
        let bytes: [u8; 4] = to_fixed_name("torso");
        assert_eq!(&bytes, b"tor\0");
        assert_eq!(from_fixed_name(&bytes), "tor");
    }
}
