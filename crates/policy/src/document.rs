//! IAM policy document model and its provider JSON shape.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{PolicyError, Result};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        })
    }
}

/// Who a statement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Principal {
    /// `"Principal": "*"`
    Any,
    /// An account root or role ARN.
    Aws(String),
    /// A service principal such as `logs.eu-west-1.amazonaws.com`.
    Service(String),
}

impl Principal {
    pub fn aws(arn: impl Into<String>) -> Self {
        Principal::Aws(arn.into())
    }

    pub fn service(name: impl Into<String>) -> Self {
        Principal::Service(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConditionOperator {
    StringEquals,
    StringLike,
    ArnLike,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(String),
    Multiple(Vec<String>),
}

impl From<&str> for ConditionValue {
    fn from(v: &str) -> Self {
        ConditionValue::Single(v.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(v: String) -> Self {
        ConditionValue::Single(v)
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(v: Vec<String>) -> Self {
        ConditionValue::Multiple(v)
    }
}

/// `operator -> (condition key -> value)`, e.g. `Bool -> aws:SecureTransport -> "false"`.
pub type Conditions = BTreeMap<ConditionOperator, BTreeMap<String, ConditionValue>>;

/// A single allow/deny rule. Built through [`PolicyStatement::allow`] or
/// [`PolicyStatement::deny`]; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    sid: Option<String>,
    effect: Effect,
    principals: BTreeSet<Principal>,
    actions: BTreeSet<String>,
    resources: BTreeSet<String>,
    conditions: Conditions,
}

impl PolicyStatement {
    pub fn allow() -> StatementBuilder {
        StatementBuilder::new(Effect::Allow)
    }

    pub fn deny() -> StatementBuilder {
        StatementBuilder::new(Effect::Deny)
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn principals(&self) -> &BTreeSet<Principal> {
        &self.principals
    }

    pub fn actions(&self) -> &BTreeSet<String> {
        &self.actions
    }

    pub fn resources(&self) -> &BTreeSet<String> {
        &self.resources
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn condition(&self, operator: ConditionOperator, key: &str) -> Option<&ConditionValue> {
        self.conditions.get(&operator).and_then(|m| m.get(key))
    }

    pub fn grants(&self, action: &str) -> bool {
        self.actions.contains(action)
    }
}

pub struct StatementBuilder {
    sid: Option<String>,
    effect: Effect,
    principals: BTreeSet<Principal>,
    actions: BTreeSet<String>,
    resources: BTreeSet<String>,
    conditions: Conditions,
}

impl StatementBuilder {
    fn new(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            principals: BTreeSet::new(),
            actions: BTreeSet::new(),
            resources: BTreeSet::new(),
            conditions: Conditions::new(),
        }
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.insert(principal);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.insert(resource.into());
        self
    }

    pub fn condition(
        mut self,
        operator: ConditionOperator,
        key: impl Into<String>,
        value: impl Into<ConditionValue>,
    ) -> Self {
        self.conditions
            .entry(operator)
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    fn check_actions(&self) -> Result<()> {
        if self.actions.is_empty() || self.actions.iter().any(|a| a.trim().is_empty()) {
            return Err(PolicyError::IncompleteStatement {
                effect: self.effect,
                missing: "action",
            });
        }
        Ok(())
    }

    /// Resource-scoped statement: needs at least one action and one resource.
    pub fn build(self) -> Result<PolicyStatement> {
        self.check_actions()?;
        if self.resources.is_empty() || self.resources.iter().any(|r| r.trim().is_empty()) {
            return Err(PolicyError::IncompleteStatement {
                effect: self.effect,
                missing: "resource",
            });
        }
        Ok(self.finish())
    }

    /// Role trust statement: names who may assume the role and no resource.
    pub fn build_trust(self) -> Result<PolicyStatement> {
        self.check_actions()?;
        if self.principals.is_empty() {
            return Err(PolicyError::IncompleteStatement {
                effect: self.effect,
                missing: "principal",
            });
        }
        if !self.resources.is_empty() {
            return Err(PolicyError::IncompleteStatement {
                effect: self.effect,
                missing: "resource-free trust scope",
            });
        }
        Ok(self.finish())
    }

    fn finish(self) -> PolicyStatement {
        PolicyStatement {
            sid: self.sid,
            effect: self.effect,
            principals: self.principals,
            actions: self.actions,
            resources: self.resources,
            conditions: self.conditions,
        }
    }
}

/// Single values as a string, several as an array, the way the provider writes them.
struct OneOrMany<'a, I>(&'a [I]);

impl<I: Serialize> Serialize for OneOrMany<'_, I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            [one] => one.serialize(serializer),
            many => {
                let mut seq = serializer.serialize_seq(Some(many.len()))?;
                for item in many {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

struct PrincipalBlock<'a>(&'a BTreeSet<Principal>);

impl Serialize for PrincipalBlock<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.contains(&Principal::Any) {
            return serializer.serialize_str("*");
        }
        let mut by_kind: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for p in self.0 {
            match p {
                Principal::Aws(arn) => by_kind.entry("AWS").or_default().push(arn),
                Principal::Service(name) => by_kind.entry("Service").or_default().push(name),
                Principal::Any => {}
            }
        }
        let mut map = serializer.serialize_map(Some(by_kind.len()))?;
        for (kind, values) in &by_kind {
            map.serialize_entry(kind, &OneOrMany(values))?;
        }
        map.end()
    }
}

impl Serialize for PolicyStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let actions: Vec<&String> = self.actions.iter().collect();
        let resources: Vec<&String> = self.resources.iter().collect();
        let mut map = serializer.serialize_map(None)?;
        if let Some(sid) = &self.sid {
            map.serialize_entry("Sid", sid)?;
        }
        map.serialize_entry("Effect", &self.effect)?;
        if !self.principals.is_empty() {
            map.serialize_entry("Principal", &PrincipalBlock(&self.principals))?;
        }
        map.serialize_entry("Action", &OneOrMany(&actions))?;
        if !resources.is_empty() {
            map.serialize_entry("Resource", &OneOrMany(&resources))?;
        }
        if !self.conditions.is_empty() {
            map.serialize_entry("Condition", &self.conditions)?;
        }
        map.end()
    }
}

/// Ordered list of statements plus the policy language version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    version: &'static str,
    #[serde(rename = "Statement")]
    statements: Vec<PolicyStatement>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION,
            statements: Vec::new(),
        }
    }
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statements(statements: impl IntoIterator<Item = PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statements: statements.into_iter().collect(),
        }
    }

    pub fn add_statement(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// True when `root` is allowed every action of `service` (`<service>:*` or `*`).
    pub fn grants_full_control(&self, root: &Principal, service: &str) -> bool {
        let service_wildcard = format!("{service}:*");
        self.statements.iter().any(|s| {
            s.effect == Effect::Allow
                && s.principals.contains(root)
                && (s.grants("*") || s.grants(&service_wildcard))
        })
    }

    /// Fails with [`PolicyError::MissingRootStatement`] unless `root` keeps full
    /// control of the key this document is attached to.
    pub fn ensure_key_administrator(&self, root: &Principal) -> Result<()> {
        if self.grants_full_control(root, "kms") {
            return Ok(());
        }
        let root = match root {
            Principal::Aws(arn) | Principal::Service(arn) => arn.clone(),
            Principal::Any => "*".to_string(),
        };
        Err(PolicyError::MissingRootStatement { root })
    }

    pub fn to_json(&self) -> serde_json::Result<Json> {
        serde_json::to_value(self)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
