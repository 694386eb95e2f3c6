//! Pipeline orchestration.
//!
//! [`plan`] runs load → scan → compose → render and touches nothing on disk
//! except reads. [`synth`] runs the plan and only then writes the cloud
//! assembly, so any failure in the first four stages leaves the output
//! directory exactly as it was.

use crate::assembly::{self, AssemblyError, AssemblyReport};
use crate::assets::{self, AssetBundle, AssetError};
use crate::config::{self, ConfigError, Overrides, StackConfig};
use crate::naming::NamingError;
use crate::stack::{self, HandlerBundles, SiteStack};
use crate::template::{Template, TemplateError};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("no code bundle for handler {0}")]
    HandlerCode(String),
}

/// Everything known after the in-memory stages.
#[derive(Debug, Clone)]
pub struct Plan {
    pub config: StackConfig,
    pub bundle: AssetBundle,
    pub handlers: HandlerBundles,
    pub stack: SiteStack,
    pub template: Template,
}

/// Load the project's config and build the plan.
pub fn plan(project: &Path, overrides: &Overrides) -> Result<Plan, SynthError> {
    let config = config::load_config(project, overrides)?;
    plan_with_config(project, config)
}

/// Build the plan for an already-resolved config.
///
/// Asset paths in `config` are relative to `project`.
pub fn plan_with_config(project: &Path, config: StackConfig) -> Result<Plan, SynthError> {
    let source = project.join(config.asset_source_dir());
    let bundle = assets::scan_assets(&source, config.asset_excludes())?;
    let handlers = scan_handlers(project, &config)?;
    let stack = SiteStack::synthesize(&config, &bundle, &handlers)?;
    let template = stack.to_template()?;
    debug!(
        resources = template.resources.len(),
        outputs = template.outputs.len(),
        "rendered template"
    );
    Ok(Plan {
        config,
        bundle,
        handlers,
        stack,
        template,
    })
}

/// Scan the code bundle of every handler function the config needs.
fn scan_handlers(project: &Path, config: &StackConfig) -> Result<HandlerBundles, AssetError> {
    let root = project.join(&config.handlers.source_dir);
    stack::required_handlers(config)
        .into_iter()
        .map(|(id, dir)| {
            assets::scan_assets(&root.join(dir), &[]).map(|bundle| (id.to_string(), bundle))
        })
        .collect()
}

/// Build the plan and write it as a cloud assembly into `out_dir`.
pub fn synth(
    project: &Path,
    out_dir: &Path,
    overrides: &Overrides,
) -> Result<(Plan, AssemblyReport), SynthError> {
    let plan = plan(project, overrides)?;
    let report = assembly::write_assembly(&plan, out_dir)?;
    Ok((plan, report))
}
