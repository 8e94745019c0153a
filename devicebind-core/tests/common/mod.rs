//! Fixtures shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use devicebind_core::{
    Collaborators, EnrolledFactor, Enrollment, EngineConfig, KeyType, MemoryEnrollmentStore,
    RestClient, RestRequest, RestResponse, SoftwareKeyStore, StaticKeyResolver,
    StaticProviderRegistry, StaticSignalCollector, TransportError, VerificationEngine,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use url::Url;

pub const KID: &str = "issuer-key-1";
pub const SECRET: &[u8] = b"issuer-signing-secret";
pub const CHALLENGE_TYPE: &str = devicebind_core::config::DEFAULT_CHALLENGE_TOKEN_TYPE;

pub fn claims(transaction_id: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": "https://acme.example.com",
        "aud": "device-sdk",
        "iat": now,
        "exp": now + 300,
        "nonce": format!("nonce-{transaction_id}"),
        "transactionId": transaction_id,
        "orgId": "org-1",
        "keyTypes": ["proofOfPossession", "userVerification"],
        "userVerification": "preferred",
        "userMediation": "none",
        "method": "signed_nonce",
        "verificationUri": "https://acme.example.com/idp/authenticators/verify"
    })
}

pub fn mint(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some(CHALLENGE_TYPE.to_string());
    header.kid = Some(KID.to_string());
    encode(&header, claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

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
                pending_challenge_link: Some(
                    Url::parse("https://acme.example.com/api/v1/pending").unwrap(),
                ),
            },
        ],
    }
}

/// Store both keys of an enrollment made by [`enrollment`].
pub fn add_keys(store: &SoftwareKeyStore, id: &str) {
    store.add_key(format!("pop-{id}"), KeyType::ProofOfPossession, b"pop-secret");
    store.add_key(format!("uv-{id}"), KeyType::UserVerification, b"uv-secret");
}

/// REST client that records requests and replays canned responses.
pub struct RecordingRest {
    requests: Mutex<Vec<RestRequest>>,
    responses: Mutex<VecDeque<Result<RestResponse, TransportError>>>,
}

impl RecordingRest {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn respond_with(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(Ok(RestResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn fail_with(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestClient for RecordingRest {
    async fn submit(&self, request: RestRequest) -> Result<RestResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(RestResponse {
                    status: 200,
                    body: br#"{"status":"SUCCESS"}"#.to_vec(),
                })
            })
    }
}

pub struct Harness {
    pub engine: VerificationEngine,
    pub keys: Arc<SoftwareKeyStore>,
    pub enrollments: Arc<MemoryEnrollmentStore>,
    pub rest: Arc<RecordingRest>,
}

impl Harness {
    /// One enrollment `enr-1` with both keys stored.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, StaticSignalCollector::default(), StaticProviderRegistry::new())
    }

    pub fn build(
        config: EngineConfig,
        signals: StaticSignalCollector,
        providers: StaticProviderRegistry,
    ) -> Self {
        let keys = Arc::new(SoftwareKeyStore::new());
        add_keys(&keys, "enr-1");
        let enrollments = Arc::new(MemoryEnrollmentStore::new());
        enrollments.insert(enrollment("enr-1"));
        let rest = Arc::new(RecordingRest::new());

        let collaborators = Collaborators::new(
            keys.clone(),
            enrollments.clone(),
            rest.clone(),
            Arc::new(StaticKeyResolver::new().with_hmac_secret(KID, SECRET)),
        )
        .with_signals(Arc::new(signals))
        .with_providers(Arc::new(providers));

        Self {
            engine: VerificationEngine::new(config, collaborators),
            keys,
            enrollments,
            rest,
        }
    }

    /// Claims of the response token carried by the last submission.
    pub fn submitted_claims(&self) -> Value {
        let request = self.rest.requests().pop().expect("no request submitted");
        let token = match &request.body {
            Some(body) => body["challengeResponse"].as_str().unwrap().to_string(),
            None => request
                .url
                .query_pairs()
                .find(|(k, _)| k == "challengeResponse")
                .map(|(_, v)| v.into_owned())
                .expect("no challengeResponse parameter"),
        };
        let kid = jsonwebtoken::decode_header(&token).unwrap().kid.unwrap();

        let mut validation = jsonwebtoken::Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        let data = jsonwebtoken::decode::<Value>(
            &token,
            &self.keys.decoding_key(&kid).unwrap(),
            &validation,
        )
        .unwrap();
        data.claims
    }
}
