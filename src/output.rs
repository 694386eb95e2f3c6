//! CLI output formatting for the pipeline.
//!
//! # Resource-First Display
//!
//! Output is **resource-centric, not file-centric**. Every resource is shown
//! by its positional index, logical ID and type, with the facts that matter
//! for review (bucket name, policy statements, certificate) as indented
//! context lines. Files only appear in the synth report.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Stack StaticSiteStack → app.example.com
//!     Environment: aws://123456789012/us-east-1
//!     Assets: src/frontend/lib (3 files, 1.2 KB)
//!     Hash: 3f0c9a1e2b7d
//!
//! Resources
//! 001 CloudfrontOAI (AWS::CloudFront::CloudFrontOriginAccessIdentity)
//!     Comment: OAI for StaticSiteStack
//! 002 SiteBucket (AWS::S3::Bucket)
//!     Name: app.example.com
//!     Public access: blocked
//!     Teardown: destroy, auto-delete objects
//! ...
//! 011 SiteInvalidation (Custom::CloudFrontInvalidation)
//!     Paths: /*
//!     After: DeployWithInvalidation
//!
//! Outputs
//!     Bucket: !Ref SiteBucket
//!     DistributionId: !Ref SiteDistribution
//!     Site: !GetAtt SiteDistribution.DomainName
//! ```
//!
//! ## Synth
//!
//! ```text
//! Template → cdk.out/StaticSiteStack.template.json
//! Assets → cdk.out/StaticSiteStack.assets.json
//! Manifest → cdk.out/manifest.json
//! Staged → cdk.out/asset.3f0c9a1e… (cached)
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::assembly::{AssemblyReport, environment_uri};
use crate::synth::Plan;
use std::path::Path;

const SHORT_HASH: usize = 12;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count: `512 B`, `1.2 KB`, `3.4 MB`.
fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Format the plan produced by the in-memory stages.
pub fn format_plan(plan: &Plan) -> Vec<String> {
    let mut lines = Vec::new();
    let env = &plan.config.environment;

    lines.push(format!(
        "Stack {} → {}",
        plan.stack.stack_name, plan.stack.hostname
    ));
    lines.push(format!(
        "{}Environment: {}",
        indent(1),
        environment_uri(env.account.as_deref(), env.region.as_deref())
    ));
    lines.push(format!(
        "{}Assets: {} ({}, {})",
        indent(1),
        plan.config.asset_source_dir(),
        plural(plan.bundle.files.len(), "file"),
        format_size(plan.bundle.total_size())
    ));
    lines.push(format!(
        "{}Hash: {}",
        indent(1),
        &plan.bundle.hash[..SHORT_HASH.min(plan.bundle.hash.len())]
    ));
    lines.push(format!(
        "{}Handlers: {} ({})",
        indent(1),
        plan.config.handlers.source_dir,
        plural(plan.handlers.len(), "bundle")
    ));

    lines.push(String::new());
    lines.push("Resources".to_string());
    for (i, resource) in plan.stack.resources().iter().enumerate() {
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            resource.logical_id(),
            resource.type_string()
        ));
        for fact in resource.describe() {
            lines.push(format!("{}{}", indent(1), fact));
        }
    }

    if !plan.template.outputs.is_empty() {
        lines.push(String::new());
        lines.push("Outputs".to_string());
        for (id, output) in &plan.template.outputs {
            lines.push(format!("{}{}: {}", indent(1), id, output.value));
        }
    }
    lines
}

pub fn print_plan(plan: &Plan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

/// Format the files written by synth, relative to the current directory
/// when possible.
pub fn format_synth_report(report: &AssemblyReport, cwd: &Path) -> Vec<String> {
    let show = |p: &Path| p.strip_prefix(cwd).unwrap_or(p).display().to_string();
    let staged = if report.staged { "copied" } else { "cached" };
    vec![
        format!("Template → {}", show(&report.template_path)),
        format!("Assets → {}", show(&report.assets_path)),
        format!("Manifest → {}", show(&report.manifest_path)),
        format!("Staged → {} ({})", show(&report.staged_dir), staged),
        format!("Handlers → {}", plural(report.handler_dirs.len(), "bundle")),
    ]
}

pub fn print_synth_report(report: &AssemblyReport, cwd: &Path) {
    for line in format_synth_report(report, cwd) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use crate::synth;
    use crate::test_helpers::*;
    use std::path::PathBuf;

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn plan_header_and_resources() {
        let tmp = setup_fixtures();
        let plan = synth::plan(tmp.path(), &Overrides::default()).unwrap();
        let lines = format_plan(&plan);

        assert_eq!(lines[0], "Stack StaticSiteStack → app.example.com");
        assert_eq!(lines[1], "    Environment: aws://123456789012/us-east-1");
        assert!(lines[2].starts_with("    Assets: src/frontend/lib (3 files, "));
        assert_eq!(lines[4], "    Handlers: handlers (3 bundles)");
        assert!(lines.contains(&"001 CloudfrontOAI (AWS::CloudFront::CloudFrontOriginAccessIdentity)".to_string()));
        assert!(lines.contains(&"002 SiteBucket (AWS::S3::Bucket)".to_string()));
        assert!(lines.contains(&"    Name: app.example.com".to_string()));
        assert!(lines.contains(&"    Public access: blocked".to_string()));
        assert!(lines.contains(&"    Viewer protocol: redirect-to-https".to_string()));
        assert!(lines.contains(&"    Error 403 → /error.html (1800s)".to_string()));
    }

    #[test]
    fn plan_lists_outputs() {
        let tmp = setup_fixtures();
        let plan = synth::plan(tmp.path(), &Overrides::default()).unwrap();
        let lines = format_plan(&plan);
        let start = lines.iter().position(|l| l == "Outputs").unwrap();
        assert_eq!(
            &lines[start + 1..],
            &[
                "    Bucket: !Ref SiteBucket".to_string(),
                "    DistributionId: !Ref SiteDistribution".to_string(),
                "    Site: !GetAtt SiteDistribution.DomainName".to_string(),
            ]
        );
    }

    #[test]
    fn plan_shows_bucket_policy_statement() {
        let tmp = setup_fixtures();
        let plan = synth::plan(tmp.path(), &Overrides::default()).unwrap();
        let lines = format_plan(&plan);
        let idx = lines
            .iter()
            .position(|l| l == "003 SiteBucketPolicy (AWS::S3::BucketPolicy)")
            .unwrap();
        assert_eq!(
            lines[idx + 1],
            "    Allow s3:GetObject on !GetAtt SiteBucket.Arn/*"
        );
    }

    #[test]
    fn synth_report_relative_paths() {
        let cwd = PathBuf::from("/work");
        let report = AssemblyReport {
            out_dir: cwd.join("cdk.out"),
            template_path: cwd.join("cdk.out/Site.template.json"),
            assets_path: cwd.join("cdk.out/Site.assets.json"),
            manifest_path: cwd.join("cdk.out/manifest.json"),
            staged_dir: cwd.join("cdk.out/asset.abc"),
            staged: false,
            handler_dirs: vec![cwd.join("cdk.out/asset.def")],
        };
        let lines = format_synth_report(&report, &cwd);
        assert_eq!(
            lines,
            vec![
                "Template → cdk.out/Site.template.json",
                "Assets → cdk.out/Site.assets.json",
                "Manifest → cdk.out/manifest.json",
                "Staged → cdk.out/asset.abc (cached)",
                "Handlers → 1 bundle",
            ]
        );
    }
}
