pub mod build;
pub mod deploy;
pub mod destroy;

use slipway_core::config::{Deployment, Environment};
use slipway_core::render::{render, GroupSizes, RenderContext};
use slipway_core::SlipwayError;
use std::path::Path;
use tracing::warn;

/// Per-run data every deployment unit needs, shared read-only across the
/// dispatched workers.
pub(crate) struct UnitContext {
    pub project: String,
    pub environment: Environment,
}

pub(crate) fn warn_if_production(env_name: &str) {
    if env_name == "production" {
        warn!("you are targeting the production environment");
    }
}

pub(crate) fn load_template(path: &Path) -> Result<String, SlipwayError> {
    if !path.exists() {
        return Err(SlipwayError::TemplateNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Render a unit's template against its full token context and the given
/// live group sizes.
pub(crate) fn render_unit(
    template: &str,
    context: &UnitContext,
    unit: &str,
    deployment: &Deployment,
    sizes: &GroupSizes,
) -> Result<String, SlipwayError> {
    let tokens =
        RenderContext::for_unit(&context.project, unit, deployment, &context.environment, sizes);
    Ok(render(template, &tokens, sizes, unit, deployment.start_instances)?)
}
