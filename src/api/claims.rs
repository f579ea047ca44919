use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Login token carried in the `jwt` cookie or a bearer header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub nickname: String,
    pub exp: u64,
}

impl Claims {
    pub fn new(nickname: impl Into<String>, ttl_secs: u64) -> Self {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
            + ttl_secs;
        Self {
            nickname: nickname.into(),
            exp,
        }
    }

    pub fn encode_with_key(&self, key: &[u8]) -> Result<String> {
        encode(&Header::default(), self, &EncodingKey::from_secret(key))
            .context("Failed to generate token")
    }

    pub fn decode_with_key(token: &str, key: &[u8], validation: &Validation) -> Result<Self> {
        let token_data = decode::<Claims>(token, &DecodingKey::from_secret(key), validation)
            .context("Failed to decode JWT token")?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fairings::VALIDATION;

    #[test]
    fn token_round_trips_with_the_right_key() {
        let claims = Claims::new("alice", 60);
        let token = claims.encode_with_key(b"secret").unwrap();
        assert_eq!(
            Claims::decode_with_key(&token, b"secret", &VALIDATION).unwrap(),
            claims
        );
        assert!(Claims::decode_with_key(&token, b"other", &VALIDATION).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            nickname: "bob".to_string(),
            exp: 1,
        };
        let token = claims.encode_with_key(b"secret").unwrap();
        assert!(Claims::decode_with_key(&token, b"secret", &VALIDATION).is_err());
    }
}
