//! # Manifest Generation
//!
//! Turns a plan's templates plus resolved parameters into the deployment manifest
//! submitted to the director and the credentials handed out on bind. Rendering is
//! deterministic: the same plan and parameters always produce the same output.
//!
//! Placeholders have the form `(( key ))`. A string that is exactly one placeholder
//! is replaced by the parameter value with its type intact; placeholders embedded in
//! longer strings are interpolated as text.

use crate::catalog::Plan;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("Unknown parameter '{name}' referenced in template")]
    UnknownParameter { name: String },

    #[error("Unterminated placeholder in '{template}'")]
    Unterminated { template: String },

    #[error("Parameter '{name}' cannot be interpolated into a string")]
    NotInterpolable { name: String },

    #[error("Rendered manifest has no deployment name")]
    MissingName,

    #[error("Failed to serialize manifest: {0}")]
    Serialization(String),
}

pub type ManifestResult<T> = Result<T, ManifestError>;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedManifest {
    /// Deployment name, taken from the rendered manifest's `name`
    pub deployment: String,
    /// YAML document ready for submission
    pub manifest: String,
    pub credentials: Value,
}

pub trait ManifestGenerator: Send + Sync {
    fn generate(&self, plan: &Plan, params: &Map<String, Value>) -> ManifestResult<RenderedManifest>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateManifestGenerator;

impl ManifestGenerator for TemplateManifestGenerator {
    fn generate(&self, plan: &Plan, params: &Map<String, Value>) -> ManifestResult<RenderedManifest> {
        let manifest = render(&plan.manifest, params)?;
        let credentials = render(&plan.credentials, params)?;

        let deployment = manifest
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or(ManifestError::MissingName)?
            .to_string();

        let manifest =
            serde_yaml::to_string(&manifest).map_err(|e| ManifestError::Serialization(e.to_string()))?;

        Ok(RenderedManifest {
            deployment,
            manifest,
            credentials,
        })
    }
}

/// Substitute placeholders in every string leaf of `template`
pub fn render(template: &Value, params: &Map<String, Value>) -> ManifestResult<Value> {
    match template {
        Value::String(s) => render_string(s, params),
        Value::Array(items) => items
            .iter()
            .map(|item| render(item, params))
            .collect::<ManifestResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), render(v, params)?)))
            .collect::<ManifestResult<Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn lookup<'a>(name: &str, params: &'a Map<String, Value>) -> ManifestResult<&'a Value> {
    params.get(name).ok_or_else(|| ManifestError::UnknownParameter {
        name: name.to_string(),
    })
}

fn render_string(s: &str, params: &Map<String, Value>) -> ManifestResult<Value> {
    let trimmed = s.trim();
    if let Some(inner) = trimmed.strip_prefix("((").and_then(|r| r.strip_suffix("))")) {
        if !inner.contains("((") && !inner.contains("))") {
            return lookup(inner.trim(), params).cloned();
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("((") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("))").ok_or_else(|| ManifestError::Unterminated {
            template: s.to_string(),
        })?;
        let name = after[..end].trim();
        match lookup(name, params)? {
            Value::String(v) => out.push_str(v),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            _ => {
                return Err(ManifestError::NotInterpolable {
                    name: name.to_string(),
                })
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}
