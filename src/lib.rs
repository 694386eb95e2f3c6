//! # Site Stack
//!
//! Synthesizes the infrastructure for a static website: a private S3 bucket,
//! a CloudFront distribution in front of it, the origin access identity that
//! lets one read the other, and a deployment step that uploads the site and
//! invalidates the cache. The output is a CloudFormation template plus a
//! cloud assembly directory; deploying it is left to the provisioning engine.
//! Nothing here talks to AWS.
//!
//! # Architecture: Five-Stage Pipeline
//!
//! ```text
//! 1. Load     stack.toml + flags  →  StackConfig   (validated)
//! 2. Scan     assets + handlers   →  AssetBundle   (files + content hash, per bundle)
//! 3. Compose  config + bundles    →  SiteStack     (immutable resource graph)
//! 4. Render   SiteStack           →  Template      (CloudFormation JSON)
//! 5. Write    Template + bundles  →  cdk.out/      (cloud assembly)
//! ```
//!
//! Stages 1–4 only read. The output directory is touched in stage 5, after
//! everything else has succeeded, so a bad config or a missing asset
//! directory never leaves a half-written assembly behind.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Layered `stack.toml` loading, validation, and the DNS / build variants |
//! | [`naming`] | Site hostname and S3 / stack / account / region naming rules |
//! | [`assets`] | Stage 2: walks and hashes the asset directory, stages it into the assembly |
//! | [`resources`] | Typed resource declarations and the [`resources::CfnResource`] trait |
//! | [`stack`] | Stage 3: composes [`stack::SiteStack`] from config and bundle |
//! | [`template`] | Stage 4: template model, intrinsic functions, reference checking |
//! | [`assembly`] | Stage 5: writes template, asset manifest and `manifest.json` |
//! | [`synth`] | Runs the stages in order; [`synth::SynthError`] wraps every stage's error |
//! | [`output`] | CLI output formatting for plans and synth reports |
//!
//! # Design Decisions
//!
//! ## Variants Are Data
//!
//! Custom domains and deploy-time builds are enum variants in the config
//! ([`config::DnsMode`], [`config::BuildMode`]), chosen when the stack is
//! composed. Each variant adds its resources to the same graph; there is no
//! commented-out path to switch on.
//!
//! ## Fixed Security Posture
//!
//! Public access blocking, the HTTPS redirect, the 403 error page and the
//! single-statement bucket policy are constants, not settings. The config
//! has no key that could weaken them.
//!
//! ## Content-Addressed Assets
//!
//! The asset bundle is named by a hash of its relative paths and file
//! contents. The same hash is the object key, the staging directory and the
//! invalidation's caller reference, so unchanged content re-synthesizes to
//! an identical template and changed content always triggers a new
//! invalidation. Handler function code is bundled the same way and
//! published next to the site.

pub mod assembly;
pub mod assets;
pub mod config;
pub mod naming;
pub mod output;
pub mod resources;
pub mod stack;
pub mod synth;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;
