//! Shared test utilities for the site-stack test suite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let plan = synth::plan(tmp.path(), &Overrides::default()).unwrap();
//!
//! let bucket = find_resource(&plan.template, "SiteBucket");
//! assert_eq!(bucket.resource_type, "AWS::S3::Bucket");
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::assets::{AssetBundle, AssetFile};
use crate::config::StackConfig;
use crate::stack::{
    AUTO_DELETE_HANDLER_ID, BUILD_HANDLER_ID, DEPLOYMENT_HANDLER_ID, HandlerBundles,
    INVALIDATION_HANDLER_ID,
};
use crate::template::{Resource, Template};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// The fixture project has a `stack.toml` for `app.example.com` in
/// `123456789012/us-east-1`, a pre-built site under `src/frontend/lib` and
/// handler code under `handlers/`.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// The config the fixture's `stack.toml` resolves to.
pub fn test_config() -> StackConfig {
    let mut config = StackConfig::default();
    config.site.domain_name = "example.com".into();
    config.site.site_sub_domain = "app".into();
    config.environment.account = Some("123456789012".into());
    config.environment.region = Some("us-east-1".into());
    config
}

/// One-file code bundles for every handler function, each with its own hash.
pub fn handler_bundles() -> HandlerBundles {
    [
        (AUTO_DELETE_HANDLER_ID, "index.js", 'b'),
        (DEPLOYMENT_HANDLER_ID, "index.py", 'c'),
        (BUILD_HANDLER_ID, "index.py", 'd'),
        (INVALIDATION_HANDLER_ID, "index.py", 'e'),
    ]
    .into_iter()
    .map(|(id, file, digit)| {
        let bundle = AssetBundle {
            source_dir: Path::new("handlers").join(id),
            files: vec![AssetFile {
                path: file.to_string(),
                size: 1,
                sha256: "0".repeat(64),
            }],
            hash: digit.to_string().repeat(64),
        };
        (id.to_string(), bundle)
    })
    .collect()
}

// =========================================================================
// Lookup helpers
// =========================================================================

/// Find a resource by logical ID. Panics with the declared IDs if missing.
pub fn find_resource<'a>(template: &'a Template, logical_id: &str) -> &'a Resource {
    template.resources.get(logical_id).unwrap_or_else(|| {
        let ids: Vec<&str> = template.resources.keys().map(|s| s.as_str()).collect();
        panic!("Resource '{logical_id}' not found. Available: {ids:?}")
    })
}

/// Logical IDs of every resource of the given type, sorted.
pub fn ids_of_type<'a>(template: &'a Template, resource_type: &str) -> Vec<&'a str> {
    template
        .resources
        .iter()
        .filter(|(_, r)| r.resource_type == resource_type)
        .map(|(id, _)| id.as_str())
        .collect()
}
