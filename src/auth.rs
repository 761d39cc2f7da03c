use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a bearer token. No expiry claim is set, so a token
/// stays valid until the signing secret rotates.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub username: String,
}

pub fn issue_token(
    uid: i64,
    username: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        uid,
        username: username.to_string(),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Fails closed: a malformed token and a bad signature are indistinguishable
/// to the caller.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// A stored hash that fails to parse counts as a failed verification rather
/// than an error.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::error!("Failed to parse stored password hash: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issue_verify_roundtrip() {
        let token = issue_token(42, "alice", SECRET).unwrap();
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.uid, 42);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = issue_token(42, "alice", SECRET).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(verify_token("not-a-token", SECRET).is_err());
        assert!(verify_token("", SECRET).is_err());
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let token = issue_token(42, "alice", SECRET).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(r#"{"uid":1,"username":"mallory"}"#);
        parts[1] = &forged;
        assert!(verify_token(&parts.join("."), SECRET).is_err());
    }

    // Clients decode the middle segment to show the signed-in user without
    // a server round trip, so the wire shape is part of the contract.
    #[test]
    fn test_token_wire_shape() {
        let token = issue_token(7, "bob", SECRET).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["uid"], 7);
        assert_eq!(value["username"], "bob");
        assert!(value.get("exp").is_none());
    }

    #[test]
    fn test_password_hash_verify() {
        let hash = hash_password("pass1234").unwrap();
        assert!(verify_password(&hash, "pass1234"));
        assert!(!verify_password(&hash, "wrong"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("pass1234").unwrap();
        let second = hash_password("pass1234").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_corrupt_stored_hash_fails_closed() {
        assert!(!verify_password("not-a-phc-string", "pass1234"));
    }
}
