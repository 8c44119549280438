//! RFC-4226 dynamic-truncation HOTP derivation used by the frontend's signup
//! codes: 9 lowercase hex chars `PPPHHHHHH` where `PPP` identifies the
//! provider and `HHHHHH` is a minute-windowed HMAC-SHA256 truncation.
//!
//! The signup flow itself lives in the frontend; this module only carries the
//! math so its properties (generate-then-verify, the ±offset tolerance) are
//! exercised here.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MODULUS: u32 = 1_000_000; // 16^6

/// Generates the 6-hex-digit `HHHHHH` suffix for the current UTC minute.
pub fn generate_signup_code(secret: &[u8], unix_time: i64) -> String {
    let counter = unix_time / 60;
    format!("{:06x}", truncate(secret, counter))
}

/// Accepts offsets `-2..=6` minutes from `unix_time`, matching the minute the
/// code was generated in plus clock drift/latency tolerance.
pub fn verify_signup_code(secret: &[u8], unix_time: i64, code: &str) -> bool {
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    let minute = unix_time / 60;
    for offset in -2..=6i64 {
        let candidate = format!("{:06x}", truncate(secret, minute - offset));
        if candidate == code.to_ascii_lowercase() {
            return true;
        }
    }
    false
}

fn truncate(secret: &[u8], counter: i64) -> u32 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let slice = &digest[offset..offset + 4];
    let value = u32::from_be_bytes(slice.try_into().unwrap()) & 0x7fff_ffff;
    value % MODULUS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_at_exact_minute() {
        let secret = [3u8; 32];
        let t = 1_700_000_000i64;
        let code = generate_signup_code(&secret, t);
        assert!(verify_signup_code(&secret, t, &code));
    }

    #[test]
    fn accepted_within_tolerance() {
        let secret = [3u8; 32];
        let t = 1_700_000_000i64;
        let code = generate_signup_code(&secret, t);
        assert!(verify_signup_code(&secret, t + 6 * 60, &code));
        assert!(verify_signup_code(&secret, t - 2 * 60, &code));
    }

    #[test]
    fn rejected_outside_tolerance() {
        let secret = [3u8; 32];
        let t = 1_700_000_000i64;
        let code = generate_signup_code(&secret, t);
        assert!(!verify_signup_code(&secret, t + 7 * 60, &code));
        assert!(!verify_signup_code(&secret, t - 3 * 60, &code));
    }

    #[test]
    fn wrong_secret_rejected() {
        let secret = [3u8; 32];
        let other = [4u8; 32];
        let t = 1_700_000_000i64;
        let code = generate_signup_code(&secret, t);
        assert!(!verify_signup_code(&other, t, &code));
    }
}
