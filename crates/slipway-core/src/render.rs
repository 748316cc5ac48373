use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::config::{Deployment, Environment};

/// Token delimiters used in job templates.
const OPEN: &str = "[!";
const CLOSE: &str = "!]";

/// Instance count used when a group size can be resolved neither from the
/// cluster nor from the deployment's static hint.
pub const DEFAULT_GROUP_SIZE: u64 = 2;

/// Current running instance count per task group, read from the cluster.
/// Empty on the first render pass, populated before the second.
pub type GroupSizes = HashMap<String, u64>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unclosed template token near '{snippet}'")]
    UnclosedToken { snippet: String },
}

// ---------------------------------------------------------------------------
// RenderContext
// ---------------------------------------------------------------------------

/// The layered set of named values available for token substitution.
/// Entries are immutable once built; lookups of absent tokens are not an
/// error (they render as the empty string).
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    entries: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Assemble the full context for one deployment unit: identity tokens,
    /// per-build image references, per-deployment and per-environment
    /// variables, and the live size of each known task group.
    pub fn for_unit(
        project: &str,
        unit: &str,
        deployment: &Deployment,
        environment: &Environment,
        sizes: &GroupSizes,
    ) -> Self {
        let mut ctx = Self::new();
        ctx.insert("name", project);
        ctx.insert("deployment_name", unit);
        ctx.insert("job_name", deployment.job_name(project, unit));

        for (key, build) in &deployment.builds {
            ctx.insert(format!("image_{key}"), build.deploy_image());
        }
        for (key, value) in &deployment.variables {
            ctx.insert(format!("var_{key}"), value.clone());
        }
        for (key, value) in &environment.variables {
            ctx.insert(format!("env_{key}"), value.clone());
        }
        for (group, size) in sizes {
            ctx.insert(format!("group_{group}_size"), size.to_string());
        }
        ctx
    }
}

// ---------------------------------------------------------------------------
// render
// ---------------------------------------------------------------------------

/// Substitute every `[!token!]` in `template`.
///
/// Resolution order per token:
/// 1. a non-empty exact match in `context`;
/// 2. the group-size shape `group_<name>_size` (or bare `group_size`,
///    which names the current unit): live size when known and non-zero,
///    else `static_hint` when positive, else [`DEFAULT_GROUP_SIZE`];
/// 3. the empty string.
///
/// The only failure mode is an opening marker with no closing marker.
pub fn render(
    template: &str,
    context: &RenderContext,
    sizes: &GroupSizes,
    unit: &str,
    static_hint: Option<u64>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            return Err(RenderError::UnclosedToken {
                snippet: rest[start..].chars().take(32).collect(),
            });
        };
        out.push_str(&resolve(&after[..end], context, sizes, unit, static_hint));
        rest = &after[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

fn resolve(
    token: &str,
    context: &RenderContext,
    sizes: &GroupSizes,
    unit: &str,
    static_hint: Option<u64>,
) -> String {
    if let Some(value) = context.get(token) {
        if !value.is_empty() {
            return value.to_string();
        }
    }

    let group = if token == "group_size" {
        Some(unit)
    } else {
        token
            .strip_prefix("group_")
            .and_then(|t| t.strip_suffix("_size"))
    };

    if let Some(group) = group {
        if let Some(&size) = sizes.get(group) {
            if size > 0 {
                return size.to_string();
            }
        }
        if let Some(hint) = static_hint.filter(|h| *h > 0) {
            return hint.to_string();
        }
        return DEFAULT_GROUP_SIZE.to_string();
    }

    String::new()
}

// ---------------------------------------------------------------------------
// Image references
// ---------------------------------------------------------------------------

/// Build a full image reference `<registry>/<name>:<tag>`.
///
/// The registry prefix is normalized to end in exactly one `/`; an empty
/// registry yields a bare `<name>:<tag>`. An empty tag falls back to
/// `latest`.
pub fn image_tag(registry: &str, name: &str, tag: &str) -> String {
    let tag = if tag.is_empty() { "latest" } else { tag };
    if registry.is_empty() {
        format!("{name}:{tag}")
    } else {
        format!("{}/{name}:{tag}", registry.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
