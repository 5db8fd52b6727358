//! Storage paths of volumes on a namei fileserver partition.
//!
//! A volume's files live under `/vicep<partition>/AFSIDat/<x>/<y>`, where `y`
//! is the volume id in a 64-character alphabet and `x` is the low byte of the
//! id in the same alphabet.

/// Digit alphabet; index `i` encodes the 6-bit value `i`.
const ALPHABET: &[u8; 64] = b"+=0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Encodes `num` six bits at a time, least significant digit first.
/// Zero encodes as `"+"`.
pub fn num_to_char(mut num: u32) -> String {
    if num == 0 {
        return (ALPHABET[0] as char).to_string();
    }
    let mut out = String::new();
    while num != 0 {
        out.push(ALPHABET[(num & 0x3f) as usize] as char);
        num >>= 6;
    }
    out
}

/// Directory holding the volume `volume_id` on partition `partition`
/// (the partition letter(s) after `/vicep`).
pub fn volumeid_to_path(partition: &str, volume_id: u32) -> String {
    format!(
        "/vicep{}/AFSIDat/{}/{}",
        partition,
        num_to_char(volume_id & 0xff),
        num_to_char(volume_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_low_bits_first() {
        assert_eq!(num_to_char(0), "+");
        assert_eq!(num_to_char(1), "=");
        assert_eq!(num_to_char(63), "z");
        assert_eq!(num_to_char(64), "+=");
        assert_eq!(num_to_char(u32::MAX), "zzzzz1");
    }

    #[test]
    fn known_volume_path() {
        assert_eq!(volumeid_to_path("a", 536870927), "/vicepa/AFSIDat/D/D+++U");
        assert_eq!(volumeid_to_path("b", 0), "/vicepb/AFSIDat/+/+");
    }
}
