use anyhow::{Context, Result};
use lakestack_aws::PublicAccessBlock;
use lakestack_policy::AccountContext;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_STACK_NAME: &str = "lakestack";

fn default_partition() -> String { "aws".to_string() }
fn default_max_query_execution_time() -> u32 { 14400 }
fn default_pending_window() -> u32 { 7 }

/// Everything the stack needs to know before synthesis.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    pub account_id: String,
    pub region: String,
    #[serde(default = "default_partition")]
    pub partition: String,
    #[serde(default)]
    pub stack_name: Option<String>,

    pub role_name: String,

    pub namespace_name: String,
    pub db_name: String,
    pub admin_username: String,
    pub admin_password: SecretString,
    pub workgroup_name: String,
    #[serde(default = "default_max_query_execution_time")]
    pub max_query_execution_time: u32,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,

    pub kms_alias: String,
    #[serde(default = "default_pending_window")]
    pub key_pending_window_days: u32,

    pub bucket_name: String,
    pub cloudwatch_bucket_name: String,
    #[serde(default)]
    pub data_bucket_public_access: PublicAccessBlock,
}

impl StackConfig {
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let cfg: StackConfig = serde_yaml::from_slice(bytes).context("parse stack config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Plain YAML, or age-encrypted YAML when the file ends in `.age`.
    pub fn load(path: &Path, age_ids: &[PathBuf]) -> Result<Self> {
        if path.extension().and_then(|s| s.to_str()) == Some("age") {
            let mut ids = Vec::new();
            for p in age_ids { ids.extend(lakestack_crypto::load_identities(p)?); }
            let f = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
            let dec = lakestack_crypto::decrypt_age_bytes(std::io::BufReader::new(f), &ids)?;
            Self::from_yaml(dec.expose_secret())
        } else {
            let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
            Self::from_yaml(&bytes)
        }
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("role_name", &self.role_name),
            ("namespace_name", &self.namespace_name),
            ("db_name", &self.db_name),
            ("admin_username", &self.admin_username),
            ("workgroup_name", &self.workgroup_name),
            ("kms_alias", &self.kms_alias),
            ("bucket_name", &self.bucket_name),
            ("cloudwatch_bucket_name", &self.cloudwatch_bucket_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("config field '{}' must not be empty", field);
            }
        }
        if self.admin_password.expose_secret().is_empty() {
            anyhow::bail!("config field 'admin_password' must not be empty");
        }
        if self.bucket_name == self.cloudwatch_bucket_name {
            anyhow::bail!("data and log buckets must have different names");
        }
        self.account_context()?;
        Ok(())
    }

    pub fn account_context(&self) -> Result<AccountContext> {
        Ok(AccountContext::with_partition(&self.partition, &self.account_id, &self.region)?)
    }

    pub fn stack_name(&self) -> &str {
        self.stack_name.as_deref().unwrap_or(DEFAULT_STACK_NAME)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"
account_id: "123456789012"
region: eu-west-1
role_name: s3-to-redshift
namespace_name: ingest-ns
db_name: ingest
admin_username: admin
admin_password: "Sup3r-Secret-1"
workgroup_name: ingest-wg
security_group_ids: [sg-0123]
subnet_ids: [subnet-a, subnet-b]
kms_alias: alias/ingest-data
bucket_name: ingest-data
cloudwatch_bucket_name: ingest-logs
"#;
