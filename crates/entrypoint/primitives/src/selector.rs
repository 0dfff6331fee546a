//! Post-execution validation opt-in, carried as a selector in the first four bytes of an
//! operation's signature.
use alloy_primitives::FixedBytes;
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bindings::IPostExecutionAccount;

/// A 4 byte dispatch tag.
pub type Selector = FixedBytes<4>;

/// The selector an operation embeds in its signature to request post-execution validation.
pub const POST_EXECUTION_VALIDATION_SELECTOR: Selector =
    FixedBytes(IPostExecutionAccount::validatePostExecutionCall::SELECTOR);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("malformed signature: {0} bytes is too short to carry a selector")]
    MalformedSignature(usize),
}

/// Reads the leading selector out of a signature blob.
pub fn extract_selector(signature: &[u8]) -> Result<Selector, SelectorError> {
    signature
        .get(..4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .map(FixedBytes)
        .ok_or(SelectorError::MalformedSignature(signature.len()))
}

/// Why an operation did not take part in post-execution validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The signature carries some other selector.
    NotRequested { selector: Selector },
    /// The signature is shorter than a selector.
    MalformedSignature { len: usize },
}

/// The parsed opt-in decision for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRequest {
    Skipped(SkipReason),
    RequestsValidation,
}

impl ValidationRequest {
    /// Parses a signature blob into a dispatch decision.
    ///
    /// A malformed signature is not an error here: it simply opts the operation out.
    pub fn from_signature(signature: &[u8]) -> Self {
        match extract_selector(signature) {
            Ok(selector) if selector == POST_EXECUTION_VALIDATION_SELECTOR => {
                Self::RequestsValidation
            }
            Ok(selector) => Self::Skipped(SkipReason::NotRequested { selector }),
            Err(SelectorError::MalformedSignature(len)) => {
                Self::Skipped(SkipReason::MalformedSignature { len })
            }
        }
    }

    pub const fn is_requested(&self) -> bool {
        matches!(self, Self::RequestsValidation)
    }
}
