//! Narrowly-scoped statements for the data and log buckets and the role trust
//! policy. Every function parses its ARN input first and fails with
//! `InvalidInput` instead of producing an empty or wildcard resource.

use crate::arn::BucketArn;
use crate::context::AccountContext;
use crate::document::{ConditionOperator, Principal, PolicyStatement};
use crate::error::{InputKind, PolicyError, Result};

pub const LAMBDA_SERVICE: &str = "lambda.amazonaws.com";

pub const SOURCE_ACCOUNT_KEY: &str = "aws:SourceAccount";
pub const SECURE_TRANSPORT_KEY: &str = "aws:SecureTransport";
pub const OBJECT_ACL_KEY: &str = "s3:x-amz-acl";
pub const BUCKET_OWNER_FULL_CONTROL: &str = "bucket-owner-full-control";

pub const LAMBDA_READ_ACTIONS: &[&str] = &["s3:GetObject", "s3:ListBucket"];
pub const LOG_DELIVERY_ACTIONS: &[&str] = &["s3:GetBucketAcl", "s3:PutObject"];

/// Read and list access for the function-execution service, on the bucket and
/// its objects, for functions owned by the stack's account.
pub fn lambda_access_statement(ctx: &AccountContext, bucket_arn: &str) -> Result<PolicyStatement> {
    let bucket = BucketArn::parse(bucket_arn)?;
    PolicyStatement::allow()
        .sid("AllowLambdaRead")
        .principal(Principal::service(LAMBDA_SERVICE))
        .actions(LAMBDA_READ_ACTIONS.iter().copied())
        .resource(bucket.as_str())
        .resource(bucket.objects())
        .condition(ConditionOperator::StringEquals, SOURCE_ACCOUNT_KEY, ctx.account_id())
        .build()
}

/// CloudWatch Logs export into the bucket, limited to requests made on behalf
/// of the stack's own account.
pub fn cloudwatch_logs_access_statement(ctx: &AccountContext, bucket_arn: &str) -> Result<PolicyStatement> {
    let bucket = BucketArn::parse(bucket_arn)?;
    PolicyStatement::allow()
        .sid("AllowCloudwatchLogsExport")
        .principal(ctx.log_delivery_principal())
        .actions(LOG_DELIVERY_ACTIONS.iter().copied())
        .resource(bucket.as_str())
        .resource(bucket.objects())
        .condition(ConditionOperator::StringEquals, SOURCE_ACCOUNT_KEY, ctx.account_id())
        .build()
}

/// Denies every S3 action on the bucket and its objects unless the request came over TLS.
pub fn non_secure_transport_deny_statement(bucket_arn: &str) -> Result<PolicyStatement> {
    let bucket = BucketArn::parse(bucket_arn)?;
    PolicyStatement::deny()
        .sid("DenyInsecureTransport")
        .principal(Principal::Any)
        .action("s3:*")
        .resource(bucket.as_str())
        .resource(bucket.objects())
        .condition(ConditionOperator::Bool, SECURE_TRANSPORT_KEY, "false")
        .build()
}

/// Lets log delivery read the log bucket's ACL. Scoped to the bucket, never its objects.
pub fn log_delivery_acl_check_statement(ctx: &AccountContext, log_bucket_arn: &str) -> Result<PolicyStatement> {
    let bucket = BucketArn::parse(log_bucket_arn)?;
    PolicyStatement::allow()
        .sid("AllowLogDeliveryAclCheck")
        .principal(ctx.log_delivery_principal())
        .action("s3:GetBucketAcl")
        .resource(bucket.as_str())
        .condition(ConditionOperator::StringEquals, SOURCE_ACCOUNT_KEY, ctx.account_id())
        .build()
}

/// Lets log delivery write objects, only when the bucket owner gets full control of them.
pub fn log_delivery_put_object_statement(ctx: &AccountContext, log_bucket_arn: &str) -> Result<PolicyStatement> {
    let bucket = BucketArn::parse(log_bucket_arn)?;
    PolicyStatement::allow()
        .sid("AllowLogDeliveryWrite")
        .principal(ctx.log_delivery_principal())
        .action("s3:PutObject")
        .resource(bucket.objects())
        .condition(ConditionOperator::StringEquals, OBJECT_ACL_KEY, BUCKET_OWNER_FULL_CONTROL)
        .condition(ConditionOperator::StringEquals, SOURCE_ACCOUNT_KEY, ctx.account_id())
        .build()
}

/// Trust statement letting `service` assume the role it is attached to.
pub fn assume_role_statement(service: &str) -> Result<PolicyStatement> {
    let valid = !service.is_empty()
        && service.contains('.')
        && service
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    if !valid {
        return Err(PolicyError::invalid(
            InputKind::ServicePrincipal,
            service,
            "expected a service host like redshift.amazonaws.com",
        ));
    }
    PolicyStatement::allow()
        .principal(Principal::service(service))
        .action("sts:AssumeRole")
        .build_trust()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ConditionValue, Effect};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    const BUCKET: &str = "arn:aws:s3:::my-bucket";

    fn ctx() -> AccountContext {
        AccountContext::new("123456789012", "eu-west-1").unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn single(v: &str) -> ConditionValue {
        ConditionValue::Single(v.to_string())
    }

    type Builder = fn(&str) -> Result<PolicyStatement>;

    fn all_builders() -> Vec<(&'static str, Builder)> {
        let lambda: Builder = |b: &str| lambda_access_statement(&ctx(), b);
        let cloudwatch: Builder = |b: &str| cloudwatch_logs_access_statement(&ctx(), b);
        let acl_check: Builder = |b: &str| log_delivery_acl_check_statement(&ctx(), b);
        let put_object: Builder = |b: &str| log_delivery_put_object_statement(&ctx(), b);
        vec![
            ("lambda", lambda),
            ("cloudwatch", cloudwatch),
            ("tls-deny", non_secure_transport_deny_statement as Builder),
            ("acl-check", acl_check),
            ("put-object", put_object),
        ]
    }

    #[test]
    fn tls_deny_covers_bucket_and_objects() {
        let stmt = non_secure_transport_deny_statement(BUCKET).unwrap();
        assert_eq!(stmt.effect(), Effect::Deny);
        assert_eq!(stmt.principals(), &BTreeSet::from([Principal::Any]));
        assert_eq!(stmt.resources(), &set(&["arn:aws:s3:::my-bucket", "arn:aws:s3:::my-bucket/*"]));
        assert_eq!(
            stmt.condition(ConditionOperator::Bool, "aws:SecureTransport"),
            Some(&single("false"))
        );
    }

    #[test]
    fn lambda_statement_reads_and_lists() {
        let stmt = lambda_access_statement(&ctx(), BUCKET).unwrap();
        assert_eq!(stmt.effect(), Effect::Allow);
        assert_eq!(stmt.principals(), &BTreeSet::from([Principal::service("lambda.amazonaws.com")]));
        assert_eq!(stmt.actions(), &set(&["s3:GetObject", "s3:ListBucket"]));
        assert_eq!(stmt.resources(), &set(&[BUCKET, "arn:aws:s3:::my-bucket/*"]));
        assert_eq!(
            stmt.condition(ConditionOperator::StringEquals, "aws:SourceAccount"),
            Some(&single("123456789012"))
        );
    }

    #[test]
    fn cloudwatch_statement_is_pinned_to_source_account() {
        let stmt = cloudwatch_logs_access_statement(&ctx(), BUCKET).unwrap();
        assert_eq!(
            stmt.principals(),
            &BTreeSet::from([Principal::service("logs.eu-west-1.amazonaws.com")])
        );
        assert!(stmt.grants("s3:PutObject"));
        assert!(stmt.grants("s3:GetBucketAcl"));
        assert_eq!(
            stmt.condition(ConditionOperator::StringEquals, "aws:SourceAccount"),
            Some(&single("123456789012"))
        );
    }

    #[test]
    fn acl_check_is_scoped_to_bucket_only() {
        let stmt = log_delivery_acl_check_statement(&ctx(), BUCKET).unwrap();
        assert_eq!(stmt.actions(), &set(&["s3:GetBucketAcl"]));
        assert_eq!(stmt.resources(), &set(&[BUCKET]));
    }

    #[test]
    fn put_object_requires_owner_full_control() {
        let stmt = log_delivery_put_object_statement(&ctx(), BUCKET).unwrap();
        assert_eq!(stmt.actions(), &set(&["s3:PutObject"]));
        assert_eq!(stmt.resources(), &set(&["arn:aws:s3:::my-bucket/*"]));
        assert_eq!(
            stmt.condition(ConditionOperator::StringEquals, "s3:x-amz-acl"),
            Some(&single("bucket-owner-full-control"))
        );
        assert_eq!(
            stmt.condition(ConditionOperator::StringEquals, "aws:SourceAccount"),
            Some(&single("123456789012"))
        );
    }

    #[test]
    fn put_object_serializes_both_conditions_under_one_operator() {
        let v = serde_json::to_value(log_delivery_put_object_statement(&ctx(), BUCKET).unwrap()).unwrap();
        assert_eq!(
            v["Condition"],
            serde_json::json!({
                "StringEquals": {
                    "aws:SourceAccount": "123456789012",
                    "s3:x-amz-acl": "bucket-owner-full-control"
                }
            })
        );
        assert_eq!(v["Resource"], "arn:aws:s3:::my-bucket/*");
    }

    #[test]
    fn every_builder_rejects_empty_arn() {
        for (name, build) in all_builders() {
            match build("") {
                Err(PolicyError::InvalidInput { kind: InputKind::BucketArn, .. }) => {}
                other => panic!("{name}: expected InvalidInput, got {other:?}"),
            }
        }
    }

    #[test]
    fn every_builder_rejects_wrong_resource_type() {
        for (name, build) in all_builders() {
            assert!(
                build("arn:aws:iam::123456789012:role/demo").is_err(),
                "{name} accepted a role ARN"
            );
            assert!(build("arn:aws:s3:::*").is_err(), "{name} accepted a wildcard bucket");
        }
    }

    #[test]
    fn assume_role_statement_validates_service() {
        let stmt = assume_role_statement("redshift.amazonaws.com").unwrap();
        assert!(stmt.resources().is_empty());
        assert!(stmt.grants("sts:AssumeRole"));
        assert!(assume_role_statement("").is_err());
        assert!(assume_role_statement("*").is_err());
    }

    fn bucket_name() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9-]{1,30}[a-z0-9]"
    }

    proptest! {
        #[test]
        fn tls_deny_resource_set_is_exact(name in bucket_name()) {
            let arn = format!("arn:aws:s3:::{name}");
            let stmt = non_secure_transport_deny_statement(&arn).unwrap();
            let expected: BTreeSet<String> = [arn.clone(), format!("{arn}/*")].into_iter().collect();
            prop_assert_eq!(stmt.resources(), &expected);
            prop_assert_eq!(stmt.effect(), Effect::Deny);
        }

        #[test]
        fn builders_are_idempotent(name in bucket_name()) {
            let arn = format!("arn:aws:s3:::{name}");
            for (_, build) in all_builders() {
                prop_assert_eq!(build(&arn).unwrap(), build(&arn).unwrap());
            }
        }

        #[test]
        fn builders_stay_inside_their_bucket(name in bucket_name()) {
            let arn = format!("arn:aws:s3:::{name}");
            let objects = format!("{arn}/*");
            for (_, build) in all_builders() {
                let stmt = build(&arn).unwrap();
                prop_assert!(!stmt.resources().is_empty());
                for r in stmt.resources() {
                    prop_assert!(r == &arn || r == &objects, "unexpected resource {}", r);
                }
            }
        }
    }
}
