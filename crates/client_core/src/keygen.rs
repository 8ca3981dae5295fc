use rand::Rng;

/// Session keys are read aloud or typed from another screen, so the alphabet
/// drops the visually ambiguous 0/O/1/I. Length and alphabet are part of the
/// contract users rely on when sharing keys.
pub const KEY_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const KEY_LEN: usize = 8;

/// Draws a key uniformly from the alphabet. The RNG is injected so property
/// tests can run against a seeded generator.
pub fn generate_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form used for lookups: keys compare case-insensitively.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
