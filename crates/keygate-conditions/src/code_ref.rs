//! Content-addressed references to remote predicate programs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConditionError, ConditionResult};

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const CID_V0_LEN: usize = 46;
const CID_V1_MIN_LEN: usize = 10;
const CID_V1_MAX_LEN: usize = 128;

/// A content identifier (CID) naming an immutable predicate program.
///
/// Accepts CIDv0 (`Qm…`, base58btc, 46 characters) and base32 CIDv1
/// (`b…`, lowercase RFC 4648 alphabet).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeRef(String);

impl CodeRef {
    /// Parse a content identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] if `cid` is not a CIDv0 or
    /// base32 CIDv1 string.
    pub fn parse(cid: impl Into<String>) -> ConditionResult<Self> {
        let cid = cid.into();
        if is_cid_v0(&cid) || is_cid_v1(&cid) {
            Ok(Self(cid))
        } else {
            Err(ConditionError::malformed(format!(
                "not a content identifier: {cid:?}"
            )))
        }
    }

    /// The identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_cid_v0(cid: &str) -> bool {
    cid.len() == CID_V0_LEN
        && cid.starts_with("Qm")
        && cid.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn is_cid_v1(cid: &str) -> bool {
    let Some(body) = cid.strip_prefix('b') else {
        return false;
    };
    (CID_V1_MIN_LEN..=CID_V1_MAX_LEN).contains(&cid.len())
        && body
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
}

impl fmt::Display for CodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CodeRef {
    type Error = ConditionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CodeRef> for String {
    fn from(value: CodeRef) -> Self {
        value.0
    }
}
