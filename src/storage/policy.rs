//! Signed browser-upload policies.
//!
//! A policy is a base64 JSON document listing an expiration and `eq`
//! conditions on the form fields; the signature is a BLAKE3 keyed hash of
//! the base64 text.

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const EXPIRATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadPolicy {
    pub expiration: String,
    /// `["eq", "$field", value]` triples.
    pub conditions: Vec<(String, String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPolicy {
    pub policy: String,
    pub signature: String,
}

/// Form fields a policy can pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFields<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub owner: &'a str,
}

impl PolicyFields<'_> {
    fn value_of(&self, field: &str) -> Option<&str> {
        match field {
            "$bucket" => Some(self.bucket),
            "$key" => Some(self.key),
            "$x-goog-meta-owner" => Some(self.owner),
            _ => None,
        }
    }
}

pub fn sign(key: &[u8; 32], policy_base64: &str) -> String {
    BASE64.encode(blake3::keyed_hash(key, policy_base64.as_bytes()).as_bytes())
}

pub fn generate(
    key: &[u8; 32],
    fields: &PolicyFields<'_>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<SignedPolicy> {
    let policy = UploadPolicy {
        expiration: (now + ttl).format(EXPIRATION_FORMAT).to_string(),
        conditions: vec![
            eq_condition("$bucket", fields.bucket),
            eq_condition("$key", fields.key),
            eq_condition("$x-goog-meta-owner", fields.owner),
        ],
    };
    let policy = BASE64.encode(serde_json::to_vec(&policy)?);
    let signature = sign(key, &policy);
    Ok(SignedPolicy { policy, signature })
}

fn eq_condition(field: &str, value: &str) -> (String, String, String) {
    ("eq".to_string(), field.to_string(), value.to_string())
}

/// Check signature, expiry and every condition against the submitted fields.
pub fn verify(
    key: &[u8; 32],
    policy_base64: &str,
    signature: &str,
    fields: &PolicyFields<'_>,
    now: DateTime<Utc>,
) -> Result<UploadPolicy> {
    let submitted: [u8; 32] = BASE64
        .decode(signature.trim())
        .context("signature is not base64")?
        .try_into()
        .map_err(|_| anyhow!("signature has the wrong length"))?;
    let expected = blake3::keyed_hash(key, policy_base64.as_bytes());
    if expected != blake3::Hash::from_bytes(submitted) {
        bail!("policy signature does not match");
    }

    let document = BASE64
        .decode(policy_base64.trim())
        .context("policy is not base64")?;
    let policy: UploadPolicy =
        serde_json::from_slice(&document).context("policy is not a valid document")?;

    let expiration = NaiveDateTime::parse_from_str(&policy.expiration, EXPIRATION_FORMAT)
        .context("policy expiration is malformed")?
        .and_utc();
    if expiration <= now {
        bail!("policy expired at {}", policy.expiration);
    }

    for (operator, field, value) in &policy.conditions {
        if operator != "eq" {
            bail!("unsupported policy condition {operator:?}");
        }
        let actual = fields
            .value_of(field)
            .ok_or_else(|| anyhow!("policy pins unknown field {field:?}"))?;
        if actual != value {
            bail!("field {field} does not satisfy the policy");
        }
    }
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    fn fields() -> PolicyFields<'static> {
        PolicyFields {
            bucket: "uploads",
            key: "cat.jpg",
            owner: "alice",
        }
    }

    #[test]
    fn generated_policy_verifies() {
        let now = Utc::now();
        let signed = generate(&KEY, &fields(), now, Duration::hours(1)).unwrap();
        let policy = verify(&KEY, &signed.policy, &signed.signature, &fields(), now).unwrap();
        assert_eq!(policy.conditions.len(), 3);
        assert!(policy.expiration.ends_with('Z'));
    }

    #[test]
    fn wrong_key_or_tampered_policy_is_rejected() {
        let now = Utc::now();
        let signed = generate(&KEY, &fields(), now, Duration::hours(1)).unwrap();
        assert!(verify(&[8u8; 32], &signed.policy, &signed.signature, &fields(), now).is_err());

        let other = generate(
            &KEY,
            &PolicyFields {
                owner: "mallory",
                ..fields()
            },
            now,
            Duration::hours(1),
        )
        .unwrap();
        assert!(verify(&KEY, &other.policy, &signed.signature, &fields(), now).is_err());
    }

    #[test]
    fn mismatching_field_is_rejected() {
        let now = Utc::now();
        let signed = generate(&KEY, &fields(), now, Duration::hours(1)).unwrap();
        let renamed = PolicyFields {
            key: "dog.jpg",
            ..fields()
        };
        let error = verify(&KEY, &signed.policy, &signed.signature, &renamed, now).unwrap_err();
        assert!(error.to_string().contains("$key"));
    }

    #[test]
    fn expired_policy_is_rejected() {
        let issued = Utc::now() - Duration::hours(2);
        let signed = generate(&KEY, &fields(), issued, Duration::hours(1)).unwrap();
        let error =
            verify(&KEY, &signed.policy, &signed.signature, &fields(), Utc::now()).unwrap_err();
        assert!(error.to_string().contains("expired"));
    }
}
