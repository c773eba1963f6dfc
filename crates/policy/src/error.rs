use std::fmt;
use thiserror::Error;

use crate::document::Effect;

/// What kind of input a builder rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    BucketArn,
    RoleArn,
    AccountId,
    Region,
    Partition,
    ServicePrincipal,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputKind::BucketArn => "bucket ARN",
            InputKind::RoleArn => "role ARN",
            InputKind::AccountId => "account id",
            InputKind::Region => "region",
            InputKind::Partition => "partition",
            InputKind::ServicePrincipal => "service principal",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidInput {
        kind: InputKind,
        value: String,
        reason: &'static str,
    },
    #[error("{effect} statement has no {missing}")]
    IncompleteStatement {
        effect: Effect,
        missing: &'static str,
    },
    #[error("key policy does not let {root} administer the key")]
    MissingRootStatement { root: String },
}

impl PolicyError {
    pub(crate) fn invalid(kind: InputKind, value: &str, reason: &'static str) -> Self {
        PolicyError::InvalidInput {
            kind,
            value: value.to_string(),
            reason,
        }
    }
}

pub type Result<T, E = PolicyError> = std::result::Result<T, E>;
