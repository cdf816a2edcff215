//! Credential Generator (spec §2 component 2): produces random
//! usernames/passwords that satisfy a per-engine charset constraint.
//!
//! This is distinct from the password *hashing*/comparison algorithm, which
//! spec §1 explicitly scopes out as an opaque external collaborator — the
//! instance passwords this module generates are stored in cleartext in the
//! `instances` table (spec §7 security notes).

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

/// Allowed character classes for a generated username/password, as returned
/// by `EngineAdapter::charset_constraints()` (spec §4.1).
#[derive(Debug, Clone, Copy)]
pub struct CharsetConstraints {
    pub allow_symbols: bool,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for CharsetConstraints {
    fn default() -> Self {
        Self { allow_symbols: true, min_length: 20, max_length: 32 }
    }
}

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SYMBOLS: &[u8] = b"!@#%^&*-_=+";

/// Generates a random password respecting `constraints`.
pub fn generate_password(constraints: CharsetConstraints) -> String {
    let mut rng = rand::thread_rng();
    let length_dist = Uniform::from(constraints.min_length..=constraints.max_length);
    let length = length_dist.sample(&mut rng);

    let alphabet: Vec<u8> = if constraints.allow_symbols {
        ALPHANUMERIC.iter().chain(SYMBOLS.iter()).copied().collect()
    } else {
        ALPHANUMERIC.to_vec()
    };

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..alphabet.len());
            alphabet[idx] as char
        })
        .collect()
}

/// Generates a random username of the form `dbaas_<8 lowercase-alnum chars>`.
///
/// Usernames never include symbols regardless of `constraints`, since every
/// supported engine's identifier grammar is a subset of alphanumeric +
/// underscore.
pub fn generate_username(prefix: &str) -> String {
    const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| LOWER_ALNUM[rng.gen_range(0..LOWER_ALNUM.len())] as char)
        .collect();
    format!("{prefix}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_respects_length_bounds() {
        let constraints = CharsetConstraints { allow_symbols: true, min_length: 12, max_length: 16 };
        for _ in 0..50 {
            let pw = generate_password(constraints);
            assert!(pw.len() >= 12 && pw.len() <= 16);
        }
    }

    #[test]
    fn password_without_symbols_is_alphanumeric() {
        let constraints = CharsetConstraints { allow_symbols: false, min_length: 20, max_length: 20 };
        let pw = generate_password(constraints);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn username_has_expected_shape() {
        let u = generate_username("app");
        assert!(u.starts_with("app_"));
        assert_eq!(u.len(), "app_".len() + 8);
        assert!(u.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }
}
