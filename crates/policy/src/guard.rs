use anyhow::Result;
use serde_json::Value as Json;
use std::collections::BTreeSet;

/// Plan-time checks on a rendered CloudFormation template.
pub struct Policy {
    pub allow_unencrypted: bool,
    /// The stack account's root, `arn:<partition>:iam::<account>:root`.
    pub root_arn: String,
}

fn resources_of_type<'a>(template: &'a Json, type_name: &'a str) -> impl Iterator<Item = (&'a String, &'a Json)> + 'a {
    template
        .get("Resources")
        .and_then(Json::as_object)
        .into_iter()
        .flat_map(|m| m.iter())
        .filter(move |(_, r)| r.get("Type").and_then(Json::as_str) == Some(type_name))
}

fn statements(document: Option<&Json>) -> &[Json] {
    document
        .and_then(|d| d.get("Statement"))
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn one_or_many(v: Option<&Json>) -> Vec<&str> {
    match v {
        Some(Json::String(s)) => vec![s.as_str()],
        Some(Json::Array(items)) => items.iter().filter_map(Json::as_str).collect(),
        _ => Vec::new(),
    }
}

fn is_allow(stmt: &Json) -> bool {
    stmt.get("Effect").and_then(Json::as_str) == Some("Allow")
}

fn names_anyone(stmt: &Json) -> bool {
    match stmt.get("Principal") {
        Some(Json::String(s)) => s == "*",
        Some(Json::Object(m)) => m.get("AWS").map_or(false, |v| one_or_many(Some(v)).contains(&"*")),
        _ => false,
    }
}

/// A TLS deny counts only if it covers both `<bucket>` and `<bucket>/*`.
fn is_tls_deny(stmt: &Json, bucket_name: Option<&str>) -> bool {
    let insecure = stmt
        .pointer("/Condition/Bool/aws:SecureTransport")
        .map_or(false, |v| v.as_str() == Some("false") || v.as_bool() == Some(false));
    let actions = one_or_many(stmt.get("Action"));
    let resources = one_or_many(stmt.get("Resource"));
    let covered = resources.iter().any(|r| {
        bucket_name.map_or(true, |name| r.ends_with(&format!(":::{name}")))
            && resources.contains(&format!("{r}/*").as_str())
    });
    stmt.get("Effect").and_then(Json::as_str) == Some("Deny")
        && insecure
        && (actions.contains(&"s3:*") || actions.contains(&"*"))
        && covered
}

fn bucket_ref(policy: &Json) -> Option<&str> {
    policy.pointer("/Properties/Bucket/Ref").and_then(Json::as_str)
}

fn bucket_name<'a>(template: &'a Json, logical_id: &str) -> Option<&'a str> {
    template
        .pointer(&format!("/Resources/{logical_id}/Properties/BucketName"))
        .and_then(Json::as_str)
}

impl Policy {
    pub fn new(allow_unencrypted: bool, root_arn: impl Into<String>) -> Self {
        Self { allow_unencrypted, root_arn: root_arn.into() }
    }

    pub fn check_template(&self, template: &Json) -> Result<()> {
        for (id, bucket) in resources_of_type(template, "AWS::S3::Bucket") {
            let has_enc = bucket.pointer("/Properties/BucketEncryption").is_some();
            if !has_enc && !self.allow_unencrypted {
                anyhow::bail!("Policy: S3 bucket '{}' requires encryption (SSE-S3 or KMS).", id);
            }
            if !has_enc {
                tracing::warn!(bucket = %id, "unencrypted bucket allowed by flag");
            }
        }

        for (id, key) in resources_of_type(template, "AWS::KMS::Key") {
            let administered = statements(key.pointer("/Properties/KeyPolicy")).iter().any(|s| {
                let actions = one_or_many(s.get("Action"));
                let roots = one_or_many(s.pointer("/Principal/AWS"));
                is_allow(s)
                    && (actions.contains(&"kms:*") || actions.contains(&"*"))
                    && roots.contains(&self.root_arn.as_str())
            });
            if !administered {
                anyhow::bail!(
                    "Policy: KMS key '{}' has no root-account administration statement for {}.",
                    id,
                    self.root_arn
                );
            }
        }

        for (id, policy) in resources_of_type(template, "AWS::S3::BucketPolicy") {
            let stmts = statements(policy.pointer("/Properties/PolicyDocument"));
            if let Some(s) = stmts.iter().find(|s| is_allow(s) && names_anyone(s)) {
                anyhow::bail!(
                    "Policy: bucket policy '{}' grants {} to every principal.",
                    id,
                    one_or_many(s.get("Action")).join(", ")
                );
            }
        }
        for id in Self::buckets_without_tls_deny(template) {
            tracing::warn!(bucket = %id, "bucket policy does not deny non-TLS requests");
        }
        Ok(())
    }

    /// Logical ids of buckets whose policy lacks a deny covering the bucket
    /// and its objects for requests without TLS.
    pub fn buckets_without_tls_deny(template: &Json) -> Vec<String> {
        let mut tls_enforced = BTreeSet::new();
        for (_, policy) in resources_of_type(template, "AWS::S3::BucketPolicy") {
            let Some(bucket) = bucket_ref(policy) else { continue };
            let name = bucket_name(template, bucket);
            let stmts = statements(policy.pointer("/Properties/PolicyDocument"));
            if stmts.iter().any(|s| is_tls_deny(s, name)) {
                tls_enforced.insert(bucket);
            }
        }
        resources_of_type(template, "AWS::S3::Bucket")
            .map(|(id, _)| id)
            .filter(|id| !tls_enforced.contains(id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROOT: &str = "arn:aws:iam::123456789012:root";

    fn guard(allow_unencrypted: bool) -> Policy {
        Policy::new(allow_unencrypted, ROOT)
    }

    fn template(resources: Json) -> Json {
        json!({ "AWSTemplateFormatVersion": "2010-09-09", "Resources": resources })
    }

    fn root_key() -> Json {
        key_administered_by(ROOT)
    }

    fn key_administered_by(root: &str) -> Json {
        json!({
            "Type": "AWS::KMS::Key",
            "Properties": { "KeyPolicy": { "Statement": [{
                "Effect": "Allow",
                "Principal": { "AWS": root },
                "Action": "kms:*",
                "Resource": "*"
            }]}}
        })
    }

    #[test]
    fn accepts_encrypted_bucket_and_administered_key() {
        let t = template(json!({
            "Key": root_key(),
            "Data": { "Type": "AWS::S3::Bucket", "Properties": { "BucketEncryption": {} } },
            "DataPolicy": {
                "Type": "AWS::S3::BucketPolicy",
                "Properties": {
                    "Bucket": { "Ref": "Data" },
                    "PolicyDocument": { "Statement": [{
                        "Effect": "Deny",
                        "Principal": "*",
                        "Action": "s3:*",
                        "Resource": ["arn:aws:s3:::d", "arn:aws:s3:::d/*"],
                        "Condition": { "Bool": { "aws:SecureTransport": "false" } }
                    }]}
                }
            }
        }));
        guard(false).check_template(&t).unwrap();
    }

    #[test]
    fn rejects_unencrypted_bucket_unless_allowed() {
        let t = template(json!({ "Data": { "Type": "AWS::S3::Bucket", "Properties": {} } }));
        let err = guard(false).check_template(&t).unwrap_err();
        assert!(err.to_string().contains("requires encryption"));
        guard(true).check_template(&t).unwrap();
    }

    #[test]
    fn rejects_key_without_root_statement() {
        let t = template(json!({
            "Key": {
                "Type": "AWS::KMS::Key",
                "Properties": { "KeyPolicy": { "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "AWS": "arn:aws:iam::123456789012:role/ingest" },
                    "Action": ["kms:Decrypt"],
                    "Resource": "*"
                }]}}
            }
        }));
        let err = guard(false).check_template(&t).unwrap_err();
        assert!(err.to_string().contains("root-account administration"));
    }

    #[test]
    fn rejects_public_allow_in_bucket_policy() {
        let t = template(json!({
            "Key": root_key(),
            "Open": {
                "Type": "AWS::S3::BucketPolicy",
                "Properties": {
                    "Bucket": { "Ref": "Data" },
                    "PolicyDocument": { "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "AWS": "*" },
                        "Action": "s3:GetObject",
                        "Resource": "arn:aws:s3:::d/*"
                    }]}
                }
            }
        }));
        let err = guard(false).check_template(&t).unwrap_err();
        assert!(err.to_string().contains("every principal"));
    }
    #[test]
    fn rejects_key_administered_by_another_account() {
        let t = template(json!({ "Key": key_administered_by("arn:aws:iam::999999999999:root") }));
        let err = guard(false).check_template(&t).unwrap_err();
        assert!(err.to_string().contains("arn:aws:iam::123456789012:root"), "{err}");
    }

    fn bucket(name: &str) -> Json {
        json!({ "Type": "AWS::S3::Bucket", "Properties": { "BucketName": name, "BucketEncryption": {} } })
    }

    fn tls_policy(bucket: &str, resources: Json) -> Json {
        json!({
            "Type": "AWS::S3::BucketPolicy",
            "Properties": {
                "Bucket": { "Ref": bucket },
                "PolicyDocument": { "Statement": [{
                    "Effect": "Deny",
                    "Principal": "*",
                    "Action": "s3:*",
                    "Resource": resources,
                    "Condition": { "Bool": { "aws:SecureTransport": "false" } }
                }]}
            }
        })
    }

    #[test]
    fn flags_buckets_without_tls_deny() {
        let t = template(json!({
            "Data": bucket("data"),
            "DataPolicy": tls_policy("Data", json!(["arn:aws:s3:::data", "arn:aws:s3:::data/*"])),
            "Logs": bucket("logs"),
        }));
        assert_eq!(Policy::buckets_without_tls_deny(&t), vec!["Logs".to_string()]);
        guard(false).check_template(&t).unwrap();
    }

    #[test]
    fn tls_deny_must_cover_bucket_and_objects() {
        let objects_only = template(json!({
            "Data": bucket("data"),
            "DataPolicy": tls_policy("Data", json!("arn:aws:s3:::data/*")),
        }));
        assert_eq!(Policy::buckets_without_tls_deny(&objects_only), vec!["Data".to_string()]);

        let other_bucket = template(json!({
            "Data": bucket("data"),
            "DataPolicy": tls_policy("Data", json!(["arn:aws:s3:::other", "arn:aws:s3:::other/*"])),
        }));
        assert_eq!(Policy::buckets_without_tls_deny(&other_bucket), vec!["Data".to_string()]);
    }
}
