//! Key types and the mapping from a challenge's user-verification policy to
//! the ordered list of keys the engine will try.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::token::UserVerification;

/// Device-bound key flavours an enrollment can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyType {
    /// Silent key proving possession of the device.
    ProofOfPossession,
    /// Key gated behind biometric or passcode confirmation.
    UserVerification,
    /// Key gated behind biometric or PIN, no passcode fallback.
    UserVerificationBioOrPin,
}

impl KeyType {
    pub fn is_user_verification(self) -> bool {
        !matches!(self, Self::ProofOfPossession)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProofOfPossession => "proofOfPossession",
            Self::UserVerification => "userVerification",
            Self::UserVerificationBioOrPin => "userVerificationBioOrPin",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proofofpossession" => Ok(Self::ProofOfPossession),
            "userverification" => Ok(Self::UserVerification),
            "userverificationbioorpin" => Ok(Self::UserVerificationBioOrPin),
            other => Err(format!("unknown key type '{other}'")),
        }
    }
}

/// Immutable ordered key-type list with a cursor over the untried entries.
///
/// Fallback only ever moves the cursor forward or swaps in a fresh list, so a
/// list held by the transaction context is never mutated behind its back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTypeList {
    types: Arc<[KeyType]>,
    start: usize,
}

impl KeyTypeList {
    pub fn new(types: impl Into<Arc<[KeyType]>>) -> Self {
        Self {
            types: types.into(),
            start: 0,
        }
    }

    pub fn single(key_type: KeyType) -> Self {
        Self::new(vec![key_type])
    }

    pub fn head(&self) -> Option<KeyType> {
        self.remaining().first().copied()
    }

    pub fn remaining(&self) -> &[KeyType] {
        &self.types[self.start.min(self.types.len())..]
    }

    /// The list with its head consumed.
    pub fn advance(&self) -> Self {
        Self {
            types: Arc::clone(&self.types),
            start: (self.start + 1).min(self.types.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining().is_empty()
    }

    pub fn len(&self) -> usize {
        self.remaining().len()
    }

    pub fn contains(&self, key_type: KeyType) -> bool {
        self.remaining().contains(&key_type)
    }
}

impl From<Vec<KeyType>> for KeyTypeList {
    fn from(types: Vec<KeyType>) -> Self {
        Self::new(types)
    }
}

/// Pure mapping from policy to the key types worth attempting.
pub struct KeyRequirementResolver;

impl KeyRequirementResolver {
    /// Compute the list for a policy and the server's advertised key types.
    ///
    /// When verification is wanted, the verification flavours the server
    /// advertises are tried in server order (plain `userVerification` when it
    /// advertises none), followed by proof of possession.
    pub fn key_types(policy: UserVerification, server_key_types: &[KeyType]) -> KeyTypeList {
        match policy {
            UserVerification::None | UserVerification::Discouraged | UserVerification::Unknown => {
                KeyTypeList::single(KeyType::ProofOfPossession)
            }
            UserVerification::Preferred | UserVerification::Required => {
                let mut types: Vec<KeyType> = server_key_types
                    .iter()
                    .copied()
                    .filter(|kt| kt.is_user_verification())
                    .fold(Vec::new(), |mut acc, kt| {
                        if !acc.contains(&kt) {
                            acc.push(kt);
                        }
                        acc
                    });
                if types.is_empty() {
                    types.push(KeyType::UserVerification);
                }
                types.push(KeyType::ProofOfPossession);
                KeyTypeList::new(types)
            }
        }
    }

    /// A list forced by an earlier cascade decision wins over a fresh computation.
    pub fn resolve(
        policy: UserVerification,
        server_key_types: &[KeyType],
        forced: Option<&KeyTypeList>,
    ) -> KeyTypeList {
        match forced {
            Some(list) => list.clone(),
            None => Self::key_types(policy, server_key_types),
        }
    }
}
