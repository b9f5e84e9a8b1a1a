use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::Rng;
use regex::Regex;

/// Extracts the first http(s) URL embedded in a freeform text blob.
///
/// Share links arrive wrapped in whatever text the platform's share sheet
/// produced ("Check this out! https://v.example.com/abc/ 7.89 copy this
/// link…"), so callers hand over the raw blob and get back just the URL.
pub fn extract_share_url(text: &str) -> Option<String> {
    static SHARE_URL: OnceLock<Regex> = OnceLock::new();
    let pattern = SHARE_URL.get_or_init(|| {
        Regex::new(r"https?://[\w.-]+[\w/-]*[\w.-]*\??[\w=&:%+-]*/?").expect("share url pattern")
    });

    pattern.find(text).map(|found| found.as_str().to_string())
}

const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a fixed-length string of random decimal digits.
///
/// Used for the device-id style query parameters some vendor APIs require.
/// The upstream only checks that the value is well-formed, so an opaque
/// random sequence from the OS entropy source is sufficient.
pub fn fixed_length_numeric_id(length: usize) -> String {
    random_sequence(DIGITS, length)
}

/// Generates a fixed-length random alphanumeric token.
pub fn rand_seq(length: usize) -> String {
    random_sequence(ALPHANUMERIC, length)
}

fn random_sequence(alphabet: &[u8], length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}
