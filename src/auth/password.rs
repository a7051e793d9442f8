use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Argon2id hash with default parameters that no password maps to. Verifying
/// against it costs the same as verifying against a stored hash.
pub const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$gxy8p6oCD4kuhJhOSZm8Tg$E4WrZehCAGQsjG/9TW610ZvFWM1TEAZk7KR4+l28NRE";

/// Argon2id PHC string with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_phc_string() {
        let a = hash_password("correct-horse").unwrap();
        let b = hash_password("correct-horse").unwrap();
        assert!(a.starts_with("$argon2"));
        assert_ne!(a, b);
        assert!(!a.contains("correct-horse"));
    }

    #[test]
    fn verify_accepts_only_the_right_password() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn dummy_hash_parses_and_rejects() {
        assert!(!verify_password("hunter2hunter2", DUMMY_HASH).unwrap());
        let real = PasswordHash::new(&hash_password("x").unwrap()).unwrap().params.to_string();
        assert_eq!(PasswordHash::new(DUMMY_HASH).unwrap().params.to_string(), real);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "plaintext-not-phc").is_err());
    }
}
