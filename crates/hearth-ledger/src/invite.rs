use rand::Rng;

/// Number of characters in an invite code.
pub const INVITE_CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh invite code from the thread-local RNG.
///
/// Codes are not checked against existing houses here. The store's UNIQUE
/// constraint reports collisions and the caller retries with a new code.
pub fn generate_invite_code() -> String {
    generate_invite_code_with(&mut rand::rng())
}

pub fn generate_invite_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..INVITE_CODE_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a user-typed code: surrounding whitespace dropped, uppercased.
pub fn normalize_invite_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == INVITE_CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}
