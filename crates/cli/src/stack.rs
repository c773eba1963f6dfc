//! Declares the ingestion stack and attaches the bucket and key policies.

use anyhow::{Context, Result};
use lakestack_aws::{aws_managed_policy_arn, AwsResource, PublicAccessBlock, RemovalPolicy};
use lakestack_cfn::CfnTemplate;
use lakestack_core::{Resource, ResourceId};
use lakestack_policy::{self as policy, BucketArn, PolicyDocument, RoleArn};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;

use crate::config::StackConfig;

pub const ROLE_ID: &str = "IngestRole";
pub const NAMESPACE_ID: &str = "WarehouseNamespace";
pub const WORKGROUP_ID: &str = "WarehouseWorkgroup";
pub const KEY_ID: &str = "DataKey";
pub const KEY_ALIAS_ID: &str = "DataKeyAlias";
pub const DATA_BUCKET_ID: &str = "DataBucket";
pub const DATA_BUCKET_POLICY_ID: &str = "DataBucketPolicy";
pub const LOG_BUCKET_ID: &str = "LogBucket";
pub const LOG_BUCKET_POLICY_ID: &str = "LogBucketPolicy";

pub const WAREHOUSE_SERVICE: &str = "redshift.amazonaws.com";
pub const ROLE_MANAGED_POLICIES: &[&str] = &[
    "AmazonRedshiftFullAccess",
    "AmazonS3FullAccess",
    "service-role/ROSAKMSProviderPolicy",
];

fn id(s: &str) -> ResourceId {
    ResourceId::new(s)
}

fn role_arn(cfg: &StackConfig) -> Result<RoleArn> {
    Ok(RoleArn::for_role(&cfg.partition, &cfg.account_id, &cfg.role_name)?)
}

fn bucket_arn(cfg: &StackConfig, name: &str) -> Result<BucketArn> {
    BucketArn::for_bucket(&cfg.partition, name).with_context(|| format!("bucket name '{name}'"))
}

pub fn key_policy(cfg: &StackConfig) -> Result<PolicyDocument> {
    let ctx = cfg.account_context()?;
    Ok(policy::kms_key_policy(&ctx, role_arn(cfg)?.as_str())?)
}

/// Lambda read access, CloudWatch Logs export, TLS-only.
pub fn data_bucket_policy(cfg: &StackConfig) -> Result<PolicyDocument> {
    let ctx = cfg.account_context()?;
    let arn = bucket_arn(cfg, &cfg.bucket_name)?;
    Ok(PolicyDocument::with_statements([
        policy::lambda_access_statement(&ctx, arn.as_str())?,
        policy::cloudwatch_logs_access_statement(&ctx, arn.as_str())?,
        policy::non_secure_transport_deny_statement(arn.as_str())?,
    ]))
}

/// Log delivery ACL check and object writes, TLS-only.
pub fn log_bucket_policy(cfg: &StackConfig) -> Result<PolicyDocument> {
    let ctx = cfg.account_context()?;
    let arn = bucket_arn(cfg, &cfg.cloudwatch_bucket_name)?;
    Ok(PolicyDocument::with_statements([
        policy::log_delivery_acl_check_statement(&ctx, arn.as_str())?,
        policy::log_delivery_put_object_statement(&ctx, arn.as_str())?,
        policy::non_secure_transport_deny_statement(arn.as_str())?,
    ]))
}

#[tracing::instrument(skip(cfg), fields(stack = cfg.stack_name()))]
pub fn build(cfg: &StackConfig) -> Result<Vec<Box<dyn Resource>>> {
    let trust = PolicyDocument::with_statements([policy::assume_role_statement(WAREHOUSE_SERVICE)?]);
    let role = AwsResource::Role {
        id: id(ROLE_ID),
        role_name: cfg.role_name.clone(),
        trust_policy: trust,
        managed_policy_arns: ROLE_MANAGED_POLICIES
            .iter()
            .map(|name| aws_managed_policy_arn(&cfg.partition, name))
            .collect(),
    };

    let namespace = AwsResource::Namespace {
        id: id(NAMESPACE_ID),
        namespace_name: cfg.namespace_name.clone(),
        db_name: cfg.db_name.clone(),
        admin_username: cfg.admin_username.clone(),
        admin_password: SecretString::new(cfg.admin_password.expose_secret().clone()),
        role: id(ROLE_ID),
    };

    let workgroup = AwsResource::Workgroup {
        id: id(WORKGROUP_ID),
        workgroup_name: cfg.workgroup_name.clone(),
        namespace: id(NAMESPACE_ID),
        config_parameters: BTreeMap::from([(
            "max_query_execution_time".to_string(),
            cfg.max_query_execution_time.to_string(),
        )]),
        security_group_ids: cfg.security_group_ids.clone(),
        subnet_ids: cfg.subnet_ids.clone(),
    };

    let key = AwsResource::KmsKey {
        id: id(KEY_ID),
        role: id(ROLE_ID),
        enabled: true,
        pending_window_days: cfg.key_pending_window_days,
        key_policy: key_policy(cfg)?,
        removal: RemovalPolicy::Destroy,
    };
    let alias = AwsResource::KmsAlias {
        id: id(KEY_ALIAS_ID),
        alias_name: cfg.kms_alias.clone(),
        key: id(KEY_ID),
    };

    let data_bucket = AwsResource::Bucket {
        id: id(DATA_BUCKET_ID),
        bucket_name: cfg.bucket_name.clone(),
        versioned: true,
        kms_key: Some(id(KEY_ID)),
        public_access: cfg.data_bucket_public_access,
        removal: RemovalPolicy::Destroy,
    };
    let data_policy = AwsResource::BucketPolicy {
        id: id(DATA_BUCKET_POLICY_ID),
        bucket: id(DATA_BUCKET_ID),
        document: data_bucket_policy(cfg)?,
    };

    let log_bucket = AwsResource::Bucket {
        id: id(LOG_BUCKET_ID),
        bucket_name: cfg.cloudwatch_bucket_name.clone(),
        versioned: true,
        kms_key: Some(id(KEY_ID)),
        public_access: PublicAccessBlock::default(),
        removal: RemovalPolicy::Destroy,
    };
    let log_policy = AwsResource::BucketPolicy {
        id: id(LOG_BUCKET_POLICY_ID),
        bucket: id(LOG_BUCKET_ID),
        document: log_bucket_policy(cfg)?,
    };

    let resources: Vec<Box<dyn Resource>> = vec![
        Box::new(role),
        Box::new(namespace),
        Box::new(workgroup),
        Box::new(key),
        Box::new(alias),
        Box::new(data_bucket),
        Box::new(data_policy),
        Box::new(log_bucket),
        Box::new(log_policy),
    ];
    tracing::debug!(resources = resources.len(), "stack declared");
    Ok(resources)
}

/// Declares, orders, renders and checks the whole stack.
pub fn synth(cfg: &StackConfig, guard: &policy::Policy) -> Result<CfnTemplate> {
    let resources = build(cfg)?;
    let synthesized = lakestack_core::synth_all(&resources)?;
    let description = format!("{} data-ingestion stack", cfg.stack_name());
    let template = CfnTemplate::from_synthesized(&description, synthesized)?;
    guard.check_template(&template.to_json()?)?;
    Ok(template)
}
