use std::fmt;

use alloy_primitives::{B256, keccak256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::RewardError;

/// ERC20 `Transfer` event.
pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

/// ERC20 `transfer` function.
pub const TRANSFER_FUNCTION: &str = "transfer(address,uint256)";

/// ERC20 `transferFrom` function.
pub const TRANSFER_FROM_FUNCTION: &str = "transferFrom(address,address,uint256)";

/// What fires a reward rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// An emitted event, keyed by topic.
    Event,
    /// A called function, keyed by signature hash.
    Function,
}

/// An event or function that triggers reward distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trigger {
    /// Event or function.
    pub kind: TriggerKind,
    /// Canonical signature text.
    pub text: String,
    /// `keccak256` of the canonical text.
    pub signature: B256,
}

impl Trigger {
    /// Event trigger from `Name(type,...)`.
    pub fn event(text: &str) -> Result<Self, RewardError> {
        Self::new(TriggerKind::Event, text)
    }

    /// Function trigger from `name(type,...)`.
    pub fn function(text: &str) -> Result<Self, RewardError> {
        Self::new(TriggerKind::Function, text)
    }

    fn new(kind: TriggerKind, text: &str) -> Result<Self, RewardError> {
        let text = canonical_signature(text)?;
        let signature = keccak256(text.as_bytes());
        Ok(Self { kind, text, signature })
    }

    /// Triggers of a plain ERC20 token: the `Transfer` event plus `transfer` and `transferFrom`.
    pub fn erc20() -> Vec<Self> {
        [
            (TriggerKind::Event, TRANSFER_EVENT),
            (TriggerKind::Function, TRANSFER_FUNCTION),
            (TriggerKind::Function, TRANSFER_FROM_FUNCTION),
        ]
        .into_iter()
        .map(|(kind, text)| Self {
            kind,
            text: text.to_string(),
            signature: keccak256(text.as_bytes()),
        })
        .collect()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, self.signature)
    }
}

/// Strips whitespace and checks the `name(params)` shape.
pub fn canonical_signature(text: &str) -> Result<String, RewardError> {
    let canonical: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = || RewardError::InvalidSignature(text.to_string());

    let open = canonical.find('(').ok_or_else(invalid)?;
    let (name, params) = canonical.split_at(open);

    let mut chars = name.chars();
    let valid_head = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid_head || !valid_tail || !params.ends_with(')') {
        return Err(invalid());
    }

    let mut depth = 0i32;
    for (index, c) in params.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 || (depth == 0 && index != params.len() - 1) {
                    return Err(invalid());
                }
            }
            c if c.is_ascii_alphanumeric() || matches!(c, ',' | '[' | ']' | '_') => {}
            _ => return Err(invalid()),
        }
    }
    if depth != 0 {
        return Err(invalid());
    }

    Ok(canonical)
}

/// Signature hash of `text` after canonicalization.
pub fn signature_hash(text: &str) -> Result<B256, RewardError> {
    canonical_signature(text).map(|canonical| keccak256(canonical.as_bytes()))
}

/// Signature hash of a bound contract call.
pub fn call_signature<C: SolCall>() -> B256 {
    keccak256(C::SIGNATURE.as_bytes())
}
