//! Typed ARNs for the resources a policy can be scoped to.
//!
//! The builders take plain strings from the orchestration layer and parse them
//! here, so an empty or mistyped ARN is rejected before it can end up as a
//! statement resource.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{InputKind, PolicyError, Result};

fn arn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^arn:(?P<partition>aws(?:-[a-z]+)*):(?P<service>[a-z0-9-]+):(?P<region>[a-z0-9-]*):(?P<account>[0-9]*):(?P<resource>.+)$",
        )
        .expect("ARN pattern compiles")
    })
}

fn bucket_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("bucket name pattern compiles"))
}

fn partition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^aws(-[a-z]+)*$").expect("partition pattern compiles"))
}

/// `aws`, `aws-cn`, `aws-us-gov` and the like.
pub(crate) fn is_partition(s: &str) -> bool {
    partition_pattern().is_match(s)
}

fn group<'h>(caps: &regex::Captures<'h>, name: &str) -> &'h str {
    caps.name(name).map(|m| m.as_str()).unwrap_or_default()
}

struct Parts<'a> {
    service: &'a str,
    region: &'a str,
    account: &'a str,
    resource: &'a str,
}

fn split(kind: InputKind, raw: &str) -> Result<Parts<'_>> {
    if raw.trim().is_empty() {
        return Err(PolicyError::invalid(kind, raw, "empty"));
    }
    let caps = arn_pattern()
        .captures(raw)
        .ok_or_else(|| PolicyError::invalid(kind, raw, "not an ARN"))?;
    let parts = Parts {
        service: group(&caps, "service"),
        region: group(&caps, "region"),
        account: group(&caps, "account"),
        resource: group(&caps, "resource"),
    };
    if parts.resource.contains(['*', '?']) {
        return Err(PolicyError::invalid(kind, raw, "wildcards are not allowed"));
    }
    Ok(parts)
}

/// `arn:<partition>:s3:::<bucket>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketArn(String);

impl BucketArn {
    pub fn parse(raw: &str) -> Result<Self> {
        let kind = InputKind::BucketArn;
        let parts = split(kind, raw)?;
        if parts.service != "s3" {
            return Err(PolicyError::invalid(kind, raw, "not an S3 ARN"));
        }
        if !parts.region.is_empty() || !parts.account.is_empty() {
            return Err(PolicyError::invalid(kind, raw, "bucket ARNs carry no region or account"));
        }
        if parts.resource.contains('/') {
            return Err(PolicyError::invalid(kind, raw, "names an object, not a bucket"));
        }
        if !bucket_name_pattern().is_match(parts.resource) {
            return Err(PolicyError::invalid(kind, raw, "invalid bucket name"));
        }
        Ok(BucketArn(raw.to_string()))
    }

    pub fn for_bucket(partition: &str, bucket_name: &str) -> Result<Self> {
        Self::parse(&format!("arn:{partition}:s3:::{bucket_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every object in the bucket: `<bucket arn>/*`.
    pub fn objects(&self) -> String {
        format!("{}/*", self.0)
    }
}

impl fmt::Display for BucketArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `arn:<partition>:iam::<account>:role/<path/name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleArn(String);

impl RoleArn {
    pub fn parse(raw: &str) -> Result<Self> {
        let kind = InputKind::RoleArn;
        let parts = split(kind, raw)?;
        if parts.service != "iam" {
            return Err(PolicyError::invalid(kind, raw, "not an IAM ARN"));
        }
        if !parts.region.is_empty() {
            return Err(PolicyError::invalid(kind, raw, "IAM ARNs carry no region"));
        }
        if parts.account.is_empty() {
            return Err(PolicyError::invalid(kind, raw, "missing account"));
        }
        match parts.resource.strip_prefix("role/") {
            Some(name) if !name.is_empty() && !name.ends_with('/') => {}
            _ => return Err(PolicyError::invalid(kind, raw, "not a role")),
        }
        Ok(RoleArn(raw.to_string()))
    }

    pub fn for_role(partition: &str, account_id: &str, role_name: &str) -> Result<Self> {
        Self::parse(&format!("arn:{partition}:iam::{account_id}:role/{role_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
