//! Stack configuration module.
//!
//! Handles loading, validating, and merging `stack.toml`. Configuration is
//! layered: stock defaults are overridden by the project's `stack.toml`,
//! which is in turn overridden by command-line flags and environment
//! variables (`--account`, `SITE_STACK_REGION`, ...).
//!
//! ```text
//! stock defaults  →  <project>/stack.toml  →  CLI / env overrides
//! ```
//!
//! Every layer is a TOML table and layers are merged key-by-key with
//! [`merge_toml`], so each layer only has to mention what it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! stack_name = "StaticSiteStack"
//! description = "Static site served from a private S3 bucket through CloudFront"
//!
//! [site]
//! domain_name = "example.com"   # required
//! site_sub_domain = "app"       # required → app.example.com
//!
//! [environment]
//! account = "123456789012"      # omit for an environment-agnostic template
//! region = "us-east-1"
//! bootstrap_qualifier = "hnb659fds"
//!
//! [assets]
//! source_dir = "src/frontend/lib"
//!
//! [bucket]
//! removal_policy = "destroy"    # destroy | retain
//! auto_delete_objects = true
//!
//! [distribution]
//! default_root_object = "chatmodel.html"
//!
//! [handlers]
//! source_dir = "handlers"       # one subdirectory per handler function
//!
//! [dns]
//! mode = "route53"
//! hosted_zone_id = "Z0123456789ABCDEFGHIJ"
//! zone_name = "example.com"     # defaults to site.domain_name
//!
//! [build]
//! mode = "container"
//! source_dir = "src/frontend"
//! build_commands = ["npm run build"]
//!
//! [build.environment]
//! LAMBDA_MODEL_INVOKE_HOST = "abc.lambda-url.us-east-1.on.aws"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::naming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the config file looked up in the project directory.
pub const CONFIG_FILENAME: &str = "stack.toml";

/// Region a CloudFront viewer certificate must be issued in.
pub const CERTIFICATE_REGION: &str = "us-east-1";

/// Build-time endpoint variables the front end knows how to consume.
pub const KNOWN_BUILD_VARIABLES: &[&str] = &[
    "LAMBDA_AGENT_INVOKE_HOST",
    "LAMBDA_KB_INGEST_HOST",
    "LAMBDA_KB_HOST_HOST",
    "LAMBDA_KB_INVOKE_HOST",
    "LAMBDA_MODEL_INVOKE_HOST",
    "LAMBDA_S3_PRESIGN_HOST",
    "LAMBDA_S3_QUERY_HOST",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Config naming error: {0}")]
    Naming(#[from] naming::NamingError),
}

/// Stack configuration loaded from `stack.toml`.
///
/// Everything except the `[site]` names has a default. Unknown keys are
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// CloudFormation stack name; also used in the access-identity comment.
    pub stack_name: String,
    /// Template description.
    pub description: String,
    pub site: SiteConfig,
    pub environment: EnvironmentConfig,
    pub assets: AssetsConfig,
    pub bucket: BucketConfig,
    pub distribution: DistributionConfig,
    pub handlers: HandlersConfig,
    pub dns: DnsMode,
    pub build: BuildMode,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "StaticSiteStack".to_string(),
            description: "Static site served from a private S3 bucket through CloudFront"
                .to_string(),
            site: SiteConfig::default(),
            environment: EnvironmentConfig::default(),
            assets: AssetsConfig::default(),
            bucket: BucketConfig::default(),
            distribution: DistributionConfig::default(),
            handlers: HandlersConfig::default(),
            dns: DnsMode::default(),
            build: BuildMode::default(),
        }
    }
}

/// The two names the whole stack is derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Apex domain, e.g. `example.com`.
    pub domain_name: String,
    /// Label(s) in front of the domain, e.g. `app`.
    pub site_sub_domain: String,
}

impl SiteConfig {
    /// Fully-qualified site hostname: `{site_sub_domain}.{domain_name}`.
    pub fn hostname(&self) -> Result<String, naming::NamingError> {
        naming::site_hostname(&self.site_sub_domain, &self.domain_name)
    }
}

/// Deployment environment. Both fields absent means environment-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub account: Option<String>,
    pub region: Option<String>,
    /// Qualifier of the bootstrap resources (assets bucket name).
    pub bootstrap_qualifier: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            account: None,
            region: None,
            bootstrap_qualifier: "hnb659fds".to_string(),
        }
    }
}

/// Where the pre-built site lives, relative to the project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    pub source_dir: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            source_dir: "src/frontend/lib".to_string(),
        }
    }
}

/// What happens to the bucket when the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    /// Delete the bucket with the stack. Fine for demos, not for production.
    Destroy,
    /// Leave the bucket (and its objects) behind.
    Retain,
}

impl RemovalPolicy {
    /// The `DeletionPolicy` / `UpdateReplacePolicy` value in a template.
    pub fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

/// Bucket teardown settings. Public access is always blocked and has no
/// setting here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BucketConfig {
    pub removal_policy: RemovalPolicy,
    /// Empty the bucket before deleting it. Requires `removal_policy = "destroy"`.
    pub auto_delete_objects: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributionConfig {
    /// Object returned for requests to `/`.
    pub default_root_object: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            default_root_object: "chatmodel.html".to_string(),
        }
    }
}

/// Code of the custom-resource handler functions.
///
/// Each handler the stack needs is read from its own subdirectory
/// (`auto-delete-objects`, `bucket-deployment`, `deploy-time-build`,
/// `cloudfront-invalidation`) and published next to the site bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlersConfig {
    pub source_dir: String,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            source_dir: "handlers".to_string(),
        }
    }
}

/// Whether the site gets a custom domain with its own certificate.
///
/// Variants without settings are empty structs; keys next to their `mode`
/// are unknown keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case", deny_unknown_fields)]
pub enum DnsMode {
    /// Serve from the distribution's default `*.cloudfront.net` domain.
    None {},
    /// Issue a DNS-validated certificate and alias the hostname in a
    /// Route 53 hosted zone.
    Route53(Route53Zone),
}

impl Default for DnsMode {
    fn default() -> Self {
        DnsMode::None {}
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Route53Zone {
    /// Hosted zone ID, with or without the `/hostedzone/` prefix.
    pub hosted_zone_id: String,
    /// Zone apex. Defaults to `site.domain_name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
}

impl Route53Zone {
    /// Hosted zone ID without the `/hostedzone/` prefix.
    pub fn zone_id(&self) -> &str {
        self.hosted_zone_id
            .strip_prefix("/hostedzone/")
            .unwrap_or(&self.hosted_zone_id)
    }
}

/// How the site's files are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case", deny_unknown_fields)]
pub enum BuildMode {
    /// Upload `assets.source_dir` as-is.
    PreBuilt {},
    /// Upload the front-end sources and build them at deploy time.
    Container(ContainerBuild),
}

impl Default for BuildMode {
    fn default() -> Self {
        BuildMode::PreBuilt {}
    }
}

/// Deploy-time build of the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerBuild {
    /// Front-end project directory, relative to the project root.
    pub source_dir: String,
    /// Path components skipped when staging the sources.
    pub exclude: Vec<String>,
    pub install_commands: Vec<String>,
    pub build_commands: Vec<String>,
    /// Directory inside `source_dir` holding the build output.
    pub output_dir: String,
    /// Environment passed to the build (endpoint URLs).
    pub environment: BTreeMap<String, String>,
}

impl Default for ContainerBuild {
    fn default() -> Self {
        Self {
            source_dir: "src/frontend".to_string(),
            exclude: vec!["node_modules".to_string(), "dist".to_string()],
            install_commands: vec!["npm ci".to_string()],
            build_commands: vec!["npm run build".to_string()],
            output_dir: "lib".to_string(),
            environment: BTreeMap::new(),
        }
    }
}

impl StackConfig {
    /// Validate values that serde alone cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        naming::validate_stack_name(&self.stack_name)?;
        let hostname = self.site.hostname()?;
        naming::validate_bucket_name(&hostname)?;
        if let Some(account) = &self.environment.account {
            naming::validate_account(account)?;
        }
        if let Some(region) = &self.environment.region {
            naming::validate_region(region)?;
        }
        if self.environment.bootstrap_qualifier.is_empty()
            || !self
                .environment
                .bootstrap_qualifier
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ConfigError::Validation(
                "environment.bootstrap_qualifier must be lowercase alphanumeric".into(),
            ));
        }
        if self.assets.source_dir.is_empty() {
            return Err(ConfigError::Validation(
                "assets.source_dir must not be empty".into(),
            ));
        }
        if self.handlers.source_dir.is_empty() {
            return Err(ConfigError::Validation(
                "handlers.source_dir must not be empty".into(),
            ));
        }
        if self.bucket.auto_delete_objects && self.bucket.removal_policy != RemovalPolicy::Destroy {
            return Err(ConfigError::Validation(
                "bucket.auto_delete_objects requires bucket.removal_policy = \"destroy\"".into(),
            ));
        }
        let root = &self.distribution.default_root_object;
        if root.is_empty() || root.starts_with('/') {
            return Err(ConfigError::Validation(
                "distribution.default_root_object must be a non-empty object key without a leading '/'"
                    .into(),
            ));
        }
        if let DnsMode::Route53(zone) = &self.dns {
            self.validate_zone(zone, &hostname)?;
        }
        if let BuildMode::Container(build) = &self.build {
            validate_container_build(build)?;
        }
        Ok(())
    }

    fn validate_zone(&self, zone: &Route53Zone, hostname: &str) -> Result<(), ConfigError> {
        if self.environment.region.as_deref() != Some(CERTIFICATE_REGION) {
            return Err(ConfigError::Validation(format!(
                "dns.mode = \"route53\" requires environment.region = \"{CERTIFICATE_REGION}\""
            )));
        }
        let id = zone.zone_id();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(ConfigError::Validation(format!(
                "dns.hosted_zone_id '{}' must be an uppercase alphanumeric zone ID",
                zone.hosted_zone_id
            )));
        }
        let apex = self.zone_name();
        if hostname != apex && !hostname.ends_with(&format!(".{apex}")) {
            return Err(ConfigError::Validation(format!(
                "site hostname '{hostname}' is not inside hosted zone '{apex}'"
            )));
        }
        Ok(())
    }

    /// Apex of the hosted zone: `dns.zone_name` or the site's domain name.
    pub fn zone_name(&self) -> &str {
        match &self.dns {
            DnsMode::Route53(Route53Zone {
                zone_name: Some(name),
                ..
            }) => name.trim_end_matches('.'),
            _ => &self.site.domain_name,
        }
    }

    /// The directory (relative to the project root) uploaded by the deployment.
    pub fn asset_source_dir(&self) -> &str {
        match &self.build {
            BuildMode::PreBuilt {} => &self.assets.source_dir,
            BuildMode::Container(build) => &build.source_dir,
        }
    }

    /// Path components excluded when scanning the asset source.
    pub fn asset_excludes(&self) -> &[String] {
        match &self.build {
            BuildMode::PreBuilt {} => &[],
            BuildMode::Container(build) => &build.exclude,
        }
    }
}

fn validate_container_build(build: &ContainerBuild) -> Result<(), ConfigError> {
    if build.source_dir.is_empty() {
        return Err(ConfigError::Validation(
            "build.source_dir must not be empty".into(),
        ));
    }
    if build.build_commands.is_empty() {
        return Err(ConfigError::Validation(
            "build.build_commands must not be empty".into(),
        ));
    }
    if build.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "build.output_dir must not be empty".into(),
        ));
    }
    for (key, value) in &build.environment {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!(
                "build.environment.{key} must not be empty"
            )));
        }
        if !KNOWN_BUILD_VARIABLES.contains(&key.as_str()) {
            warn!(variable = %key, "build environment variable is not one the front end reads");
        }
    }
    Ok(())
}

// =============================================================================
// Overrides from the command line / environment
// =============================================================================

/// Values supplied outside `stack.toml`. `None` leaves the file's value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub account: Option<String>,
    pub region: Option<String>,
    pub domain_name: Option<String>,
    pub site_sub_domain: Option<String>,
}

impl Overrides {
    /// Render the overrides as a sparse TOML table for [`merge_toml`].
    ///
    /// Returns `None` when nothing is overridden.
    pub fn to_toml(&self) -> Option<toml::Value> {
        let mut root = toml::Table::new();
        let mut environment = toml::Table::new();
        let mut site = toml::Table::new();
        if let Some(account) = &self.account {
            environment.insert("account".into(), toml::Value::String(account.clone()));
        }
        if let Some(region) = &self.region {
            environment.insert("region".into(), toml::Value::String(region.clone()));
        }
        if let Some(domain) = &self.domain_name {
            site.insert("domain_name".into(), toml::Value::String(domain.clone()));
        }
        if let Some(sub) = &self.site_sub_domain {
            site.insert("site_sub_domain".into(), toml::Value::String(sub.clone()));
        }
        if !environment.is_empty() {
            root.insert("environment".into(), toml::Value::Table(environment));
        }
        if !site.is_empty() {
            root.insert("site".into(), toml::Value::Table(site));
        }
        if root.is_empty() {
            None
        } else {
            Some(toml::Value::Table(root))
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer every user override is merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(StackConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `stack.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `stack.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    debug!(path = %config_path.display(), "loaded stack config");
    Ok(Some(value))
}

/// Merge the optional layers onto a base value in order, then deserialize
/// and validate.
pub fn resolve_config(
    base: toml::Value,
    layers: impl IntoIterator<Item = Option<toml::Value>>,
) -> Result<StackConfig, ConfigError> {
    let merged = layers.into_iter().flatten().fold(base, merge_toml);
    let config: StackConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective config for a project directory.
///
/// Stock defaults, then `<root>/stack.toml`, then `overrides`. The result is
/// validated; a missing `stack.toml` is fine as long as the overrides supply
/// the site names.
pub fn load_config(root: &Path, overrides: &Overrides) -> Result<StackConfig, ConfigError> {
    let base = stock_defaults_value();
    let file = load_raw_config(root)?;
    resolve_config(base, [file, overrides.to_toml()])
}

/// Returns a fully-commented stock `stack.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Site Stack Configuration
# ========================
# Values shown below are the defaults, except [site], which has none and
# must be filled in (or passed as --domain-name / --sub-domain).
#
# Precedence: stock defaults < stack.toml < command-line flags / environment.
# Unknown keys will cause an error.

# CloudFormation stack name.
stack_name = "StaticSiteStack"

# Template description.
description = "Static site served from a private S3 bucket through CloudFront"

# ---------------------------------------------------------------------------
# Site names
# ---------------------------------------------------------------------------
[site]
# The bucket is named "<site_sub_domain>.<domain_name>", so the result must
# be a valid, globally unique S3 bucket name.
domain_name = ""
site_sub_domain = ""

# ---------------------------------------------------------------------------
# Deployment environment
# ---------------------------------------------------------------------------
[environment]
# Leave both unset for an environment-agnostic template.
# Flags: --account / --region. Env: SITE_STACK_ACCOUNT / SITE_STACK_REGION.
# account = "123456789012"
# region = "us-east-1"

# Qualifier of the bootstrap assets bucket
# (cdk-<qualifier>-assets-<account>-<region>).
bootstrap_qualifier = "hnb659fds"

# ---------------------------------------------------------------------------
# Pre-built site files
# ---------------------------------------------------------------------------
[assets]
# Directory uploaded to the bucket, relative to the project directory.
# Must exist when synthesizing.
source_dir = "src/frontend/lib"

# ---------------------------------------------------------------------------
# Bucket teardown
# ---------------------------------------------------------------------------
[bucket]
# "destroy" deletes the bucket with the stack; "retain" keeps it.
# The defaults suit disposable deployments, not production.
removal_policy = "destroy"

# Empty the bucket before deletion. Requires removal_policy = "destroy".
auto_delete_objects = true

# ---------------------------------------------------------------------------
# Distribution
# ---------------------------------------------------------------------------
[distribution]
# Object served for "/".
default_root_object = "chatmodel.html"

# ---------------------------------------------------------------------------
# Custom-resource handlers
# ---------------------------------------------------------------------------
[handlers]
# Directory holding the handler functions' code, relative to the project
# directory. Each handler the stack uses must have a subdirectory:
#   auto-delete-objects      (bucket.auto_delete_objects = true)
#   bucket-deployment        (build.mode = "pre-built")
#   deploy-time-build        (build.mode = "container")
#   cloudfront-invalidation
source_dir = "handlers"

# ---------------------------------------------------------------------------
# Custom domain
# ---------------------------------------------------------------------------
[dns]
# "none" serves from the distribution's *.cloudfront.net domain.
# "route53" issues a DNS-validated certificate and an alias record; needs
# region = "us-east-1" and:
#   hosted_zone_id = "Z0123456789ABCDEFGHIJ"
#   zone_name = "example.com"   # optional, defaults to site.domain_name
mode = "none"

# ---------------------------------------------------------------------------
# Front-end build
# ---------------------------------------------------------------------------
[build]
# "pre-built" uploads [assets].source_dir.
# "container" uploads the front-end sources and builds them at deploy time:
#   source_dir = "src/frontend"
#   exclude = ["node_modules", "dist"]
#   install_commands = ["npm ci"]
#   build_commands = ["npm run build"]
#   output_dir = "lib"
#   [build.environment]
#   LAMBDA_AGENT_INVOKE_HOST = "..."
#   LAMBDA_KB_INGEST_HOST = "..."
#   LAMBDA_KB_HOST_HOST = "..."
#   LAMBDA_KB_INVOKE_HOST = "..."
#   LAMBDA_MODEL_INVOKE_HOST = "..."
#   LAMBDA_S3_PRESIGN_HOST = "..."
#   LAMBDA_S3_QUERY_HOST = "..."
mode = "pre-built"
"##
}
