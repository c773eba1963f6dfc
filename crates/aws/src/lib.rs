use anyhow::Result;
use lakestack_core::{Resource, ResourceId};
use lakestack_policy::PolicyDocument;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, BTreeSet};

/// What the lifecycle engine does with the resource when the stack goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

impl RemovalPolicy {
    fn cfn_value(self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl Default for PublicAccessBlock {
    fn default() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

/// `arn:<partition>:iam::aws:policy/<name>`
pub fn aws_managed_policy_arn(partition: &str, name: &str) -> String {
    format!("arn:{partition}:iam::aws:policy/{name}")
}

fn get_att_arn(id: &ResourceId) -> Json {
    json!({ "Fn::GetAtt": [id.as_str(), "Arn"] })
}

fn reference(id: &ResourceId) -> Json {
    json!({ "Ref": id.as_str() })
}

#[derive(Debug)]
pub enum AwsResource {
    Role {
        id: ResourceId,
        role_name: String,
        trust_policy: PolicyDocument,
        managed_policy_arns: Vec<String>,
    },
    Namespace {
        id: ResourceId,
        namespace_name: String,
        db_name: String,
        admin_username: String,
        admin_password: SecretString,
        role: ResourceId,
    },
    Workgroup {
        id: ResourceId,
        workgroup_name: String,
        namespace: ResourceId,
        config_parameters: BTreeMap<String, String>,
        security_group_ids: Vec<String>,
        subnet_ids: Vec<String>,
    },
    KmsKey {
        id: ResourceId,
        role: ResourceId,
        enabled: bool,
        pending_window_days: u32,
        key_policy: PolicyDocument,
        removal: RemovalPolicy,
    },
    KmsAlias {
        id: ResourceId,
        alias_name: String,
        key: ResourceId,
    },
    Bucket {
        id: ResourceId,
        bucket_name: String,
        versioned: bool,
        kms_key: Option<ResourceId>,
        public_access: PublicAccessBlock,
        removal: RemovalPolicy,
    },
    BucketPolicy {
        id: ResourceId,
        bucket: ResourceId,
        document: PolicyDocument,
    },
}

impl AwsResource {
    pub fn to_cfn_json(&self) -> Result<Json> {
        match self {
            AwsResource::Role { role_name, trust_policy, managed_policy_arns, .. } => Ok(json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "RoleName": role_name,
                    "AssumeRolePolicyDocument": trust_policy,
                    "ManagedPolicyArns": managed_policy_arns,
                }
            })),
            AwsResource::Namespace { namespace_name, db_name, admin_username, admin_password, role, .. } => {
                if admin_password.expose_secret().is_empty() {
                    anyhow::bail!("namespace '{}' has an empty admin password", namespace_name);
                }
                Ok(json!({
                    "Type": "AWS::RedshiftServerless::Namespace",
                    "Properties": {
                        "NamespaceName": namespace_name,
                        "DbName": db_name,
                        "AdminUsername": admin_username,
                        "AdminUserPassword": admin_password.expose_secret(),
                        "DefaultIamRoleArn": get_att_arn(role),
                        "IamRoles": [get_att_arn(role)],
                    }
                }))
            }
            AwsResource::Workgroup { workgroup_name, namespace, config_parameters, security_group_ids, subnet_ids, .. } => {
                let params: Vec<Json> = config_parameters
                    .iter()
                    .map(|(k, v)| json!({ "ParameterKey": k, "ParameterValue": v }))
                    .collect();
                let mut props = json!({
                    "WorkgroupName": workgroup_name,
                    "NamespaceName": reference(namespace),
                    "ConfigParameters": params,
                });
                if !security_group_ids.is_empty() { props["SecurityGroupIds"] = json!(security_group_ids); }
                if !subnet_ids.is_empty() { props["SubnetIds"] = json!(subnet_ids); }
                Ok(json!({ "Type": "AWS::RedshiftServerless::Workgroup", "Properties": props }))
            }
            AwsResource::KmsKey { enabled, pending_window_days, key_policy, removal, .. } => {
                if !(7..=30).contains(pending_window_days) {
                    anyhow::bail!("KMS pending window must be 7-30 days, got {}", pending_window_days);
                }
                Ok(json!({
                    "Type": "AWS::KMS::Key",
                    "Properties": {
                        "Enabled": enabled,
                        "PendingWindowInDays": pending_window_days,
                        "KeyPolicy": key_policy,
                    },
                    "DeletionPolicy": removal.cfn_value(),
                    "UpdateReplacePolicy": removal.cfn_value(),
                }))
            }
            AwsResource::KmsAlias { alias_name, key, .. } => {
                if !alias_name.starts_with("alias/") || alias_name.starts_with("alias/aws/") {
                    anyhow::bail!("KMS alias '{}' must start with 'alias/' and not 'alias/aws/'", alias_name);
                }
                Ok(json!({
                    "Type": "AWS::KMS::Alias",
                    "Properties": { "AliasName": alias_name, "TargetKeyId": reference(key) }
                }))
            }
            AwsResource::Bucket { bucket_name, versioned, kms_key, public_access, removal, .. } => {
                let mut props = json!({ "BucketName": bucket_name });
                if *versioned {
                    props["VersioningConfiguration"] = json!({ "Status": "Enabled" });
                }
                props["BucketEncryption"] = if let Some(key) = kms_key {
                    json!({ "ServerSideEncryptionConfiguration": [{
                        "ServerSideEncryptionByDefault": {
                            "SSEAlgorithm": "aws:kms", "KMSMasterKeyID": get_att_arn(key)
                        }}]})
                } else {
                    json!({ "ServerSideEncryptionConfiguration": [{
                        "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                    }]})
                };
                props["PublicAccessBlockConfiguration"] = json!({
                    "BlockPublicAcls": public_access.block_public_acls,
                    "BlockPublicPolicy": public_access.block_public_policy,
                    "IgnorePublicAcls": public_access.ignore_public_acls,
                    "RestrictPublicBuckets": public_access.restrict_public_buckets,
                });
                Ok(json!({
                    "Type": "AWS::S3::Bucket",
                    "Properties": props,
                    "DeletionPolicy": removal.cfn_value(),
                    "UpdateReplacePolicy": removal.cfn_value(),
                }))
            }
            AwsResource::BucketPolicy { id, bucket, document } => {
                if document.is_empty() {
                    anyhow::bail!("bucket policy '{}' has no statements", id);
                }
                Ok(json!({
                    "Type": "AWS::S3::BucketPolicy",
                    "Properties": { "Bucket": reference(bucket), "PolicyDocument": document }
                }))
            }
        }
    }
}

impl Resource for AwsResource {
    fn id(&self) -> &ResourceId {
        match self {
            AwsResource::Role { id, .. }
            | AwsResource::Namespace { id, .. }
            | AwsResource::Workgroup { id, .. }
            | AwsResource::KmsKey { id, .. }
            | AwsResource::KmsAlias { id, .. }
            | AwsResource::Bucket { id, .. }
            | AwsResource::BucketPolicy { id, .. } => id,
        }
    }

    fn deps(&self) -> BTreeSet<ResourceId> {
        let dep = match self {
            AwsResource::Role { .. } => None,
            AwsResource::Namespace { role, .. } => Some(role),
            AwsResource::Workgroup { namespace, .. } => Some(namespace),
            AwsResource::KmsKey { role, .. } => Some(role),
            AwsResource::KmsAlias { key, .. } => Some(key),
            AwsResource::Bucket { kms_key, .. } => kms_key.as_ref(),
            AwsResource::BucketPolicy { bucket, .. } => Some(bucket),
        };
        dep.into_iter().cloned().collect()
    }

    fn render(&self) -> Result<Json> {
        let body = self.to_cfn_json()?;
        tracing::debug!(id = %self.id(), kind = body["Type"].as_str().unwrap_or_default(), "rendered");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakestack_policy::{assume_role_statement, non_secure_transport_deny_statement};

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s)
    }

    fn bucket(kms_key: Option<ResourceId>) -> AwsResource {
        AwsResource::Bucket {
            id: id("DataBucket"),
            bucket_name: "ingest-data".into(),
            versioned: true,
            kms_key,
            public_access: PublicAccessBlock::default(),
            removal: RemovalPolicy::Destroy,
        }
    }

    #[test]
    fn role_renders_trust_policy_and_managed_policies() {
        let role = AwsResource::Role {
            id: id("IngestRole"),
            role_name: "s3-to-redshift".into(),
            trust_policy: PolicyDocument::with_statements([assume_role_statement("redshift.amazonaws.com").unwrap()]),
            managed_policy_arns: vec![aws_managed_policy_arn("aws", "AmazonS3FullAccess")],
        };
        let v = role.render().unwrap();
        assert_eq!(v["Type"], "AWS::IAM::Role");
        assert_eq!(
            v["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            "redshift.amazonaws.com"
        );
        assert_eq!(v["Properties"]["ManagedPolicyArns"][0], "arn:aws:iam::aws:policy/AmazonS3FullAccess");
        assert!(role.deps().is_empty());
    }

    #[test]
    fn kms_bucket_references_key_arn() {
        let b = bucket(Some(id("DataKey")));
        let v = b.render().unwrap();
        let sse = &v["Properties"]["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"];
        assert_eq!(sse["SSEAlgorithm"], "aws:kms");
        assert_eq!(sse["KMSMasterKeyID"], json!({ "Fn::GetAtt": ["DataKey", "Arn"] }));
        assert_eq!(v["Properties"]["VersioningConfiguration"]["Status"], "Enabled");
        assert_eq!(v["DeletionPolicy"], "Delete");
        assert_eq!(b.deps(), BTreeSet::from([id("DataKey")]));
    }

    #[test]
    fn bucket_without_key_falls_back_to_sse_s3() {
        let v = bucket(None).render().unwrap();
        assert_eq!(
            v["Properties"]["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
            "AES256"
        );
        assert!(bucket(None).deps().is_empty());
    }

    #[test]
    fn namespace_and_workgroup_wiring() {
        let ns = AwsResource::Namespace {
            id: id("Namespace"),
            namespace_name: "ingest-ns".into(),
            db_name: "ingest".into(),
            admin_username: "admin".into(),
            admin_password: SecretString::new("Sup3rSecret!".into()),
            role: id("IngestRole"),
        };
        let v = ns.render().unwrap();
        assert_eq!(v["Properties"]["DefaultIamRoleArn"], json!({ "Fn::GetAtt": ["IngestRole", "Arn"] }));
        assert_eq!(ns.deps(), BTreeSet::from([id("IngestRole")]));

        let wg = AwsResource::Workgroup {
            id: id("Workgroup"),
            workgroup_name: "ingest-wg".into(),
            namespace: id("Namespace"),
            config_parameters: BTreeMap::from([("max_query_execution_time".to_string(), "14400".to_string())]),
            security_group_ids: vec!["sg-1".into()],
            subnet_ids: vec![],
        };
        let v = wg.render().unwrap();
        assert_eq!(v["Properties"]["NamespaceName"], json!({ "Ref": "Namespace" }));
        assert_eq!(v["Properties"]["ConfigParameters"][0]["ParameterValue"], "14400");
        assert!(v["Properties"].get("SubnetIds").is_none());
        assert_eq!(wg.deps(), BTreeSet::from([id("Namespace")]));
    }

    #[test]
    fn empty_admin_password_is_rejected() {
        let ns = AwsResource::Namespace {
            id: id("Namespace"),
            namespace_name: "ingest-ns".into(),
            db_name: "ingest".into(),
            admin_username: "admin".into(),
            admin_password: SecretString::new(String::new()),
            role: id("IngestRole"),
        };
        assert!(ns.render().is_err());
    }

    #[test]
    fn key_and_alias_validation() {
        let key = AwsResource::KmsKey {
            id: id("DataKey"),
            role: id("IngestRole"),
            enabled: true,
            pending_window_days: 3,
            key_policy: PolicyDocument::new(),
            removal: RemovalPolicy::Destroy,
        };
        assert!(key.render().is_err());

        let alias = AwsResource::KmsAlias { id: id("Alias"), alias_name: "ingest".into(), key: id("DataKey") };
        assert!(alias.render().is_err());
        let alias = AwsResource::KmsAlias { id: id("Alias"), alias_name: "alias/ingest".into(), key: id("DataKey") };
        assert_eq!(alias.render().unwrap()["Properties"]["TargetKeyId"], json!({ "Ref": "DataKey" }));
    }

    #[test]
    fn bucket_policy_embeds_document() {
        let policy = AwsResource::BucketPolicy {
            id: id("DataBucketPolicy"),
            bucket: id("DataBucket"),
            document: PolicyDocument::with_statements([
                non_secure_transport_deny_statement("arn:aws:s3:::ingest-data").unwrap()
            ]),
        };
        let v = policy.render().unwrap();
        assert_eq!(v["Properties"]["Bucket"], json!({ "Ref": "DataBucket" }));
        assert_eq!(v["Properties"]["PolicyDocument"]["Statement"][0]["Effect"], "Deny");

        let empty = AwsResource::BucketPolicy { id: id("P"), bucket: id("DataBucket"), document: PolicyDocument::new() };
        assert!(empty.render().is_err());
    }
}
