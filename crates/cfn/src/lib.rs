use anyhow::{Context, Result};
use lakestack_core::Synthesized;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const TEMPLATE_FILE: &str = "template.json";

fn aws() -> Result<PathBuf> {
    which::which("aws").context("aws cli not found in PATH")
}

#[tracing::instrument(skip(template_file), fields(template = %template_file.display()))]
pub fn deploy_stack(stack_name: &str, template_file: &Path, region: Option<&str>) -> Result<()> {
    let aws = aws()?;
    let mut cmd = Command::new(aws);
    cmd.arg("cloudformation").arg("deploy")
        .arg("--stack-name").arg(stack_name)
        .arg("--template-file").arg(template_file)
        .arg("--capabilities").arg("CAPABILITY_NAMED_IAM");
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    let st = cmd.stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status().context("spawn aws cloudformation deploy")?;
    if !st.success() { anyhow::bail!("cloudformation deploy failed") }
    tracing::info!("stack deployed");
    Ok(())
}

#[tracing::instrument]
pub fn delete_stack(stack_name: &str, region: Option<&str>) -> Result<()> {
    let aws = aws()?;
    let mut cmd = Command::new(aws);
    cmd.arg("cloudformation").arg("delete-stack")
        .arg("--stack-name").arg(stack_name);
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    let st = cmd.status().context("aws cloudformation delete-stack")?;
    if !st.success() { anyhow::bail!("cloudformation delete-stack failed") }
    tracing::info!("stack deletion requested");
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CfnTemplate {
    #[serde(rename="AWSTemplateFormatVersion")] pub version: Option<String>,
    #[serde(rename="Description")] pub description: Option<String>,
    #[serde(rename="Resources")] pub resources: BTreeMap<String, Json>,
}

impl CfnTemplate {
    /// Each resource body gets a `DependsOn` list from its graph dependencies.
    pub fn from_synthesized(description: &str, synthesized: Vec<Synthesized>) -> Result<Self> {
        let mut resources = BTreeMap::new();
        for s in synthesized {
            let mut body = s.body;
            let obj = body.as_object_mut()
                .with_context(|| format!("resource '{}' did not render to an object", s.id))?;
            if !s.deps.is_empty() {
                let deps: Vec<Json> = s.deps.iter().map(|d| Json::String(d.0.clone())).collect();
                obj.insert("DependsOn".to_string(), Json::Array(deps));
            }
            if resources.insert(s.id.0.clone(), body).is_some() {
                anyhow::bail!("resource '{}' rendered twice", s.id);
            }
        }
        Ok(Self {
            version: Some(TEMPLATE_FORMAT_VERSION.to_string()),
            description: Some(description.to_string()),
            resources,
        })
    }

    pub fn to_json(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn write(&self, out: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
        let path = out.join(TEMPLATE_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("write {}", path.display()))?;
        tracing::info!(path = %path.display(), resources = self.resources.len(), "template written");
        Ok(path)
    }
}
