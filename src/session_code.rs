use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_LENGTH: usize = 8;

static SESSION_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{8}$").unwrap());

pub fn generate(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

pub fn is_well_formed(code: &str) -> bool {
    SESSION_CODE.is_match(code)
}

/// Codes are shown upper-case; accept whatever case the student typed.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
