//! Credential vault: symmetric authenticated encryption for passwords at rest,
//! plus the HOTP-style signup code derivation the frontend's signup flow relies on.

mod envelope;
mod signup;

pub use envelope::Vault;
pub use signup::{generate_signup_code, verify_signup_code};
