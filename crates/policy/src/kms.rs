//! Key policy for the shared data key.

use crate::arn::RoleArn;
use crate::context::AccountContext;
use crate::document::{PolicyDocument, PolicyStatement, Principal};
use crate::error::Result;

/// Every key-management action; granted only to the account root.
pub const KEY_ADMIN_ACTIONS: &[&str] = &["kms:*"];

/// Cryptographic use of the key, granted to the warehouse role.
pub const KEY_USE_ACTIONS: &[&str] = &[
    "kms:Encrypt",
    "kms:Decrypt",
    "kms:ReEncrypt*",
    "kms:GenerateDataKey*",
    "kms:DescribeKey",
];

/// In a key policy `*` is the key the policy is attached to.
pub const KEY_POLICY_RESOURCE: &str = "*";

pub fn root_account_statement(ctx: &AccountContext) -> Result<PolicyStatement> {
    PolicyStatement::allow()
        .sid("EnableRootAccountAdministration")
        .principal(ctx.root_principal())
        .actions(KEY_ADMIN_ACTIONS.iter().copied())
        .resource(KEY_POLICY_RESOURCE)
        .build()
}

pub fn role_key_use_statement(role_arn: &str) -> Result<PolicyStatement> {
    let role = RoleArn::parse(role_arn)?;
    PolicyStatement::allow()
        .sid("AllowRoleKeyUse")
        .principal(Principal::aws(role.as_str()))
        .actions(KEY_USE_ACTIONS.iter().copied())
        .resource(KEY_POLICY_RESOURCE)
        .build()
}

/// Root administration first, then the role grant. The root statement does not
/// depend on `role_arn`, so the key stays manageable if the role goes away.
#[tracing::instrument(level = "debug", skip(ctx), fields(account = ctx.account_id()))]
pub fn kms_key_policy(ctx: &AccountContext, role_arn: &str) -> Result<PolicyDocument> {
    let grant = role_key_use_statement(role_arn)?;
    let doc = PolicyDocument::with_statements([root_account_statement(ctx)?, grant]);
    doc.ensure_key_administrator(&ctx.root_principal())?;
    tracing::debug!(statements = doc.len(), "assembled key policy");
    Ok(doc)
}
