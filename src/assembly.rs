//! Cloud assembly writer.
//!
//! Writes the rendered plan into the directory layout the provisioning
//! engine reads:
//!
//! ```text
//! cdk.out/
//! ├── cdk.out                          # {"version": ...}
//! ├── manifest.json                    # artifacts: asset manifest + stack
//! ├── StaticSiteStack.template.json    # CloudFormation template
//! ├── StaticSiteStack.assets.json      # file assets → bootstrap bucket
//! └── asset.<hash>/                    # staged site files, one per handler
//! ```
//!
//! The asset manifest publishes the site bundle and the code bundle of
//! every handler function, so each `Code.S3Key` in the template names an
//! object the engine uploads before deploying the stack.
//!
//! All JSON is pretty-printed from `BTreeMap`-backed structs so repeated
//! runs produce identical bytes.

use crate::assets::{self, AssetBundle, AssetError};
use crate::stack;
use crate::synth::Plan;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Cloud assembly schema version written into every manifest.
pub const SCHEMA_VERSION: &str = "36.0.0";

const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";
const ASSET_MANIFEST_ARTIFACT_TYPE: &str = "cdk:asset-manifest";

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("staging error: {0}")]
    Staging(#[from] AssetError),
}

/// Paths written by [`write_assembly`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub out_dir: PathBuf,
    pub template_path: PathBuf,
    pub assets_path: PathBuf,
    pub manifest_path: PathBuf,
    pub staged_dir: PathBuf,
    /// `false` when the asset directory was already staged.
    pub staged: bool,
    /// Staged handler code directories, one per handler function.
    pub handler_dirs: Vec<PathBuf>,
}

// ============================================================================
// Manifest shapes
// ============================================================================

#[derive(Debug, Serialize)]
struct VersionFile {
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetManifest {
    version: &'static str,
    files: BTreeMap<String, FileAsset>,
    docker_images: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileAsset {
    source: FileSource,
    destinations: BTreeMap<String, FileDestination>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSource {
    path: String,
    packaging: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileDestination {
    bucket_name: String,
    object_key: String,
}

#[derive(Debug, Serialize)]
struct AssemblyManifest {
    version: &'static str,
    artifacts: BTreeMap<String, Artifact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    #[serde(rename = "type")]
    artifact_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    properties: ArtifactProperties,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ArtifactProperties {
    #[serde(rename_all = "camelCase")]
    Stack { template_file: String },
    AssetManifest { file: String },
}

// ============================================================================
// Writing
// ============================================================================

/// `aws://<account>/<region>`, with `unknown-account` / `unknown-region`
/// for whatever the config leaves open.
pub fn environment_uri(account: Option<&str>, region: Option<&str>) -> String {
    format!(
        "aws://{}/{}",
        account.unwrap_or("unknown-account"),
        region.unwrap_or("unknown-region")
    )
}

/// Write the plan as a cloud assembly into `out_dir`, creating it if needed.
pub fn write_assembly(plan: &Plan, out_dir: &Path) -> Result<AssemblyReport, AssemblyError> {
    create_dir(out_dir)?;
    let stack_name = &plan.stack.stack_name;
    let env = &plan.config.environment;

    let (staged_dir, staged) = assets::stage_bundle(&plan.bundle, out_dir)?;
    let mut handler_dirs = Vec::with_capacity(plan.handlers.len());
    for bundle in plan.handlers.values() {
        let (dir, _) = assets::stage_bundle(bundle, out_dir)?;
        handler_dirs.push(dir);
    }

    let template_file = format!("{stack_name}.template.json");
    let template_path = out_dir.join(&template_file);
    write_json(&template_path, &plan.template)?;

    let assets_file = format!("{stack_name}.assets.json");
    let assets_path = out_dir.join(&assets_file);
    let destination_key = format!(
        "{}-{}",
        env.account.as_deref().unwrap_or("current_account"),
        env.region.as_deref().unwrap_or("current_region")
    );
    let bucket_name = stack::bootstrap_bucket_name(env);
    let asset_manifest = AssetManifest {
        version: SCHEMA_VERSION,
        files: std::iter::once(&plan.bundle)
            .chain(plan.handlers.values())
            .map(|bundle| {
                (
                    bundle.hash.clone(),
                    file_asset(bundle, &destination_key, &bucket_name),
                )
            })
            .collect(),
        docker_images: BTreeMap::new(),
    };
    write_json(&assets_path, &asset_manifest)?;

    let assets_artifact = format!("{stack_name}.assets");
    let manifest = AssemblyManifest {
        version: SCHEMA_VERSION,
        artifacts: BTreeMap::from([
            (
                assets_artifact.clone(),
                Artifact {
                    artifact_type: ASSET_MANIFEST_ARTIFACT_TYPE,
                    environment: None,
                    properties: ArtifactProperties::AssetManifest { file: assets_file },
                    dependencies: vec![],
                    display_name: None,
                },
            ),
            (
                stack_name.clone(),
                Artifact {
                    artifact_type: STACK_ARTIFACT_TYPE,
                    environment: Some(environment_uri(
                        env.account.as_deref(),
                        env.region.as_deref(),
                    )),
                    properties: ArtifactProperties::Stack { template_file },
                    dependencies: vec![assets_artifact],
                    display_name: Some(stack_name.clone()),
                },
            ),
        ]),
    };
    let manifest_path = out_dir.join("manifest.json");
    write_json(&manifest_path, &manifest)?;
    write_json(
        &out_dir.join("cdk.out"),
        &VersionFile {
            version: SCHEMA_VERSION,
        },
    )?;

    debug!(dir = %out_dir.display(), "wrote cloud assembly");
    Ok(AssemblyReport {
        out_dir: out_dir.to_path_buf(),
        template_path,
        assets_path,
        manifest_path,
        staged_dir,
        staged,
        handler_dirs,
    })
}

fn file_asset(bundle: &AssetBundle, destination_key: &str, bucket_name: &str) -> FileAsset {
    FileAsset {
        source: FileSource {
            path: bundle.staging_dir_name(),
            packaging: "zip",
        },
        destinations: BTreeMap::from([(
            destination_key.to_string(),
            FileDestination {
                bucket_name: bucket_name.to_string(),
                object_key: bundle.object_key(),
            },
        )]),
    }
}

fn create_dir(path: &Path) -> Result<(), AssemblyError> {
    fs::create_dir_all(path).map_err(|source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AssemblyError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json).map_err(|source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
