use crate::arn::is_partition;
use crate::document::Principal;
use crate::error::{InputKind, PolicyError, Result};

/// Account, region and partition the stack is synthesized for.
///
/// Passed explicitly to every builder that needs the account root or a
/// regional service principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    partition: String,
    account_id: String,
    region: String,
}

impl AccountContext {
    pub fn new(account_id: &str, region: &str) -> Result<Self> {
        Self::with_partition("aws", account_id, region)
    }

    pub fn with_partition(partition: &str, account_id: &str, region: &str) -> Result<Self> {
        if !is_partition(partition) {
            return Err(PolicyError::invalid(InputKind::Partition, partition, "unknown partition"));
        }
        if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(PolicyError::invalid(InputKind::AccountId, account_id, "expected 12 digits"));
        }
        let region_ok = !region.is_empty()
            && region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(PolicyError::invalid(InputKind::Region, region, "expected a region code like eu-west-1"));
        }
        Ok(Self {
            partition: partition.to_string(),
            account_id: account_id.to_string(),
            region: region.to_string(),
        })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn root_arn(&self) -> String {
        format!("arn:{}:iam::{}:root", self.partition, self.account_id)
    }

    pub fn root_principal(&self) -> Principal {
        Principal::Aws(self.root_arn())
    }

    /// Regional CloudWatch Logs delivery principal, `logs.<region>.amazonaws.com`.
    pub fn log_delivery_principal(&self) -> Principal {
        Principal::Service(format!("logs.{}.amazonaws.com", self.region))
    }
}
