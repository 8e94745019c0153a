//! Fixtures shared by unit tests.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use url::Url;

use crate::config::DEFAULT_CHALLENGE_TOKEN_TYPE;
use crate::enrollment::{EnrolledFactor, Enrollment};
use crate::token::{ChallengeToken, StaticKeyResolver, TokenValidation};

pub const KID: &str = "issuer-key-1";
pub const SECRET: &[u8] = b"issuer-signing-secret";

pub fn challenge_claims(transaction_id: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": "https://acme.example.com",
        "aud": "device-sdk",
        "sub": "user-enr-1",
        "iat": now,
        "exp": now + 300,
        "nonce": format!("nonce-{transaction_id}"),
        "transactionId": transaction_id,
        "orgId": "org-1",
        "keyTypes": ["proofOfPossession", "userVerification"],
        "userVerification": "preferred",
        "userMediation": "none",
        "method": "push",
        "verificationUri": "https://acme.example.com/idp/authenticators/verify",
        "integrations": ["edr"],
        "challengeContext": {"transactionType": "LOGIN"}
    })
}

pub fn mint_with(claims: &Value, typ: &str, kid: &str, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some(typ.to_string());
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub fn mint(claims: &Value) -> String {
    mint_with(claims, DEFAULT_CHALLENGE_TOKEN_TYPE, KID, SECRET)
}

pub fn resolver() -> StaticKeyResolver {
    StaticKeyResolver::new().with_hmac_secret(KID, SECRET)
}

pub async fn parse(claims: &Value) -> ChallengeToken {
    ChallengeToken::parse(&mint(claims), &TokenValidation::default(), &resolver())
        .await
        .unwrap()
}

/// Enrollment in `org-1` with one proof-of-possession and one verification factor.
pub fn enrollment(id: &str) -> Enrollment {
    Enrollment {
        enrollment_id: id.to_string(),
        org_id: "org-1".into(),
        org_url: Url::parse("https://acme.example.com").unwrap(),
        user_id: format!("user-{id}"),
        username: Some(format!("{id}@acme.example.com")),
        device_id: format!("device-{id}"),
        factors: vec![
            EnrolledFactor {
                factor_id: format!("factor-pop-{id}"),
                proof_of_possession_key_tag: Some(format!("pop-{id}")),
                user_verification_key_tag: None,
                user_verification_bio_or_pin_key_tag: None,
                pending_challenge_link: None,
            },
            EnrolledFactor {
                factor_id: format!("factor-uv-{id}"),
                proof_of_possession_key_tag: None,
                user_verification_key_tag: Some(format!("uv-{id}")),
                user_verification_bio_or_pin_key_tag: None,
                pending_challenge_link: None,
            },
        ],
    }
}
