use rand::rngs::OsRng;
use rand::Rng;

use crate::models::DbCredentials;

/// Length of generated database/role identifiers
const IDENTIFIER_LENGTH: usize = 8;
/// Length of generated passwords
const PASSWORD_LENGTH: usize = 16;

const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random lowercase identifier, valid as a database or role name.
pub fn random_identifier(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Random alphanumeric password.
pub fn random_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Fresh credentials for one database provisioning. Each call makes
/// new values; old credentials are never re-derivable.
pub fn generate() -> DbCredentials {
    DbCredentials {
        name: random_identifier(IDENTIFIER_LENGTH),
        user: random_identifier(IDENTIFIER_LENGTH),
        pass: random_password(PASSWORD_LENGTH),
    }
}
