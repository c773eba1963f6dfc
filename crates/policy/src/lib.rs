//! Access-policy construction for the ingestion stack: typed ARNs, the policy
//! document model, the bucket and key statement builders, and plan-time
//! guardrails over the rendered template.

mod arn;
mod context;
mod document;
mod error;
mod guard;
pub mod kms;
pub mod statements;

pub use arn::{BucketArn, RoleArn};
pub use context::AccountContext;
pub use document::{
    ConditionOperator, ConditionValue, Conditions, Effect, PolicyDocument, PolicyStatement, Principal,
    StatementBuilder, POLICY_VERSION,
};
pub use error::{InputKind, PolicyError, Result};
pub use guard::Policy;
pub use kms::kms_key_policy;
pub use statements::{
    assume_role_statement, cloudwatch_logs_access_statement, lambda_access_statement,
    log_delivery_acl_check_statement, log_delivery_put_object_statement, non_secure_transport_deny_statement,
};
