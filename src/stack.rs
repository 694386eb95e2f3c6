//! The site stack: composition of every resource into one immutable graph.
//!
//! [`SiteStack::synthesize`] is the only constructor. It derives all names
//! from the validated config, picks the DNS and build variants, and wires
//! the references between resources. Nothing is registered globally; the
//! returned value *is* the stack, and rendering it is a pure function.
//!
//! ## Dependency order
//!
//! ```text
//! CloudfrontOAI
//! SiteBucket
//! SiteBucketPolicy                     (OAI canonical user → s3:GetObject)
//! AutoDeleteObjectsHandlerRole         ┐
//! AutoDeleteObjectsHandler             │ bucket.auto_delete_objects
//! SiteBucketAutoDeleteObjects          ┘
//! SiteCertificate                      ─ dns.mode = "route53"
//! SiteDistribution
//! SiteAliasRecord                      ─ dns.mode = "route53"
//! <Deploy handler>Role
//! <Deploy handler>                     BucketDeploymentHandler | DeployTimeBuildHandler
//! DeployWithInvalidation
//! InvalidationHandlerRole
//! InvalidationHandler
//! SiteInvalidation                     (DependsOn DeployWithInvalidation)
//! ```
//!
//! ## Handler code
//!
//! Every handler function runs code from its own bundle, scanned from a
//! subdirectory of `handlers.source_dir` (see [`required_handlers`]) and
//! published by the assembly next to the site bundle.

use crate::assets::AssetBundle;
use crate::config::{BuildMode, DnsMode, EnvironmentConfig, StackConfig};
use crate::naming;
use crate::resources::{
    AccessIdentity, AliasRecord, AssetLocation, AutoDeleteObjects, Bucket, BucketPolicy,
    BuildSpec, Certificate, CfnResource, DeploymentAction, Distribution, DistributionDomain,
    ErrorResponse, HandlerFunction, HandlerRole, Invalidation, MINIMUM_PROTOCOL_VERSION,
    PolicyStatement, Principal,
};
use crate::synth::SynthError;
use crate::template::{Expr, Output, Template, TemplateError};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Scanned handler code, keyed by handler logical ID.
pub type HandlerBundles = BTreeMap<String, AssetBundle>;

pub const OAI_ID: &str = "CloudfrontOAI";
pub const BUCKET_ID: &str = "SiteBucket";
pub const BUCKET_POLICY_ID: &str = "SiteBucketPolicy";
pub const AUTO_DELETE_ID: &str = "SiteBucketAutoDeleteObjects";
pub const AUTO_DELETE_HANDLER_ID: &str = "AutoDeleteObjectsHandler";
pub const DISTRIBUTION_ID: &str = "SiteDistribution";
pub const CERTIFICATE_ID: &str = "SiteCertificate";
pub const ALIAS_RECORD_ID: &str = "SiteAliasRecord";
pub const DEPLOYMENT_ID: &str = "DeployWithInvalidation";
pub const DEPLOYMENT_HANDLER_ID: &str = "BucketDeploymentHandler";
pub const BUILD_HANDLER_ID: &str = "DeployTimeBuildHandler";
pub const INVALIDATION_ID: &str = "SiteInvalidation";
pub const INVALIDATION_HANDLER_ID: &str = "InvalidationHandler";

const ORIGIN_ID: &str = "SiteBucketOrigin";
const INVALIDATION_PATHS: &[&str] = &["/*"];
const ERROR_PAGE: &str = "error.html";

/// Teardown support for `auto_delete_objects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDelete {
    pub role: HandlerRole,
    pub handler: HandlerFunction,
    pub resource: AutoDeleteObjects,
}

/// Certificate and DNS record for a custom domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDomain {
    pub certificate: Certificate,
    pub record: AliasRecord,
}

/// The composed stack.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteStack {
    pub stack_name: String,
    pub description: String,
    pub hostname: String,
    pub identity: AccessIdentity,
    pub bucket: Bucket,
    pub bucket_policy: BucketPolicy,
    pub auto_delete: Option<AutoDelete>,
    pub custom_domain: Option<CustomDomain>,
    pub distribution: Distribution,
    pub deployment_role: HandlerRole,
    pub deployment_handler: HandlerFunction,
    pub deployment: DeploymentAction,
    pub invalidation_role: HandlerRole,
    pub invalidation_handler: HandlerFunction,
    pub invalidation: Invalidation,
    pub outputs: BTreeMap<String, Output>,
}

impl SiteStack {
    /// Compose the stack for a validated config, the scanned site bundle and
    /// the code bundles of [`required_handlers`].
    pub fn synthesize(
        config: &StackConfig,
        bundle: &AssetBundle,
        handlers: &HandlerBundles,
    ) -> Result<Self, SynthError> {
        naming::validate_stack_name(&config.stack_name)?;
        let hostname = config.site.hostname()?;
        naming::validate_bucket_name(&hostname)?;
        debug!(%hostname, stack = %config.stack_name, "composing stack");

        let code_bucket = bootstrap_bucket_expr(&config.environment);

        let identity = AccessIdentity {
            logical_id: OAI_ID.to_string(),
            comment: format!("OAI for {}", config.stack_name),
        };

        let bucket = Bucket {
            logical_id: BUCKET_ID.to_string(),
            name: hostname.clone(),
            removal_policy: config.bucket.removal_policy,
            auto_delete_objects: config.bucket.auto_delete_objects,
        };

        let bucket_policy = BucketPolicy {
            logical_id: BUCKET_POLICY_ID.to_string(),
            bucket_id: BUCKET_ID.to_string(),
            statements: vec![
                PolicyStatement::allow(&["s3:GetObject"], vec![bucket.arn_for_objects()])
                    .with_principal(Principal::CanonicalUser(identity.canonical_user())),
            ],
        };

        let auto_delete = if config.bucket.auto_delete_objects {
            let code = handler_code(handlers, AUTO_DELETE_HANDLER_ID, &code_bucket)?;
            Some(auto_delete_support(&bucket, code))
        } else {
            None
        };

        let custom_domain = match &config.dns {
            DnsMode::None {} => {
                debug!(
                    protocol = MINIMUM_PROTOCOL_VERSION,
                    "no custom domain, the default CloudFront certificate governs viewer TLS"
                );
                None
            }
            DnsMode::Route53(zone) => Some(CustomDomain {
                certificate: Certificate {
                    logical_id: CERTIFICATE_ID.to_string(),
                    domain_name: hostname.clone(),
                    hosted_zone_id: zone.zone_id().to_string(),
                },
                record: AliasRecord {
                    logical_id: ALIAS_RECORD_ID.to_string(),
                    name: hostname.clone(),
                    hosted_zone_id: zone.zone_id().to_string(),
                    distribution_id: DISTRIBUTION_ID.to_string(),
                },
            }),
        };

        let distribution = Distribution {
            logical_id: DISTRIBUTION_ID.to_string(),
            default_root_object: config.distribution.default_root_object.clone(),
            minimum_protocol_version: MINIMUM_PROTOCOL_VERSION,
            error_responses: vec![ErrorResponse::forbidden_page()],
            origin_id: ORIGIN_ID.to_string(),
            bucket_id: BUCKET_ID.to_string(),
            identity: identity.clone(),
            compress: true,
            domain: custom_domain.as_ref().map(|d| DistributionDomain {
                alias: hostname.clone(),
                certificate_id: d.certificate.logical_id.clone(),
            }),
        };

        let build = match &config.build {
            BuildMode::PreBuilt {} => {
                check_site_files(bundle, &config.distribution.default_root_object);
                None
            }
            BuildMode::Container(build) => Some(BuildSpec {
                install_commands: build.install_commands.clone(),
                build_commands: build.build_commands.clone(),
                output_dir: build.output_dir.clone(),
                environment: build.environment.clone(),
            }),
        };
        let handler_id = match build {
            Some(_) => BUILD_HANDLER_ID,
            None => DEPLOYMENT_HANDLER_ID,
        };

        let deployment_role = HandlerRole {
            logical_id: format!("{handler_id}Role"),
            statements: vec![
                PolicyStatement::allow(
                    &["s3:GetObject*", "s3:GetBucket*", "s3:List*"],
                    vec![
                        bucket_arn_expr(&code_bucket),
                        Expr::concat(vec![bucket_arn_expr(&code_bucket), Expr::str("/*")]),
                    ],
                ),
                PolicyStatement::allow(
                    &[
                        "s3:GetObject*",
                        "s3:GetBucket*",
                        "s3:List*",
                        "s3:DeleteObject*",
                        "s3:PutObject",
                        "s3:Abort*",
                    ],
                    vec![bucket.arn(), bucket.arn_for_objects()],
                ),
            ],
        };

        let (description, timeout, memory_mb) = match build {
            Some(_) => (
                "Builds the front end and copies the output into the site bucket",
                Duration::from_secs(15 * 60),
                2048,
            ),
            None => (
                "Copies the site assets into the site bucket",
                Duration::from_secs(15 * 60),
                512,
            ),
        };
        let deployment_handler = HandlerFunction {
            logical_id: handler_id.to_string(),
            description: description.to_string(),
            role_id: deployment_role.logical_id.clone(),
            code: handler_code(handlers, handler_id, &code_bucket)?,
            runtime: "python3.12",
            timeout,
            memory_mb,
        };

        let mut after = vec![BUCKET_POLICY_ID.to_string()];
        if let Some(auto_delete) = &auto_delete {
            after.push(auto_delete.resource.logical_id.clone());
        }
        let deployment = DeploymentAction {
            logical_id: DEPLOYMENT_ID.to_string(),
            handler_id: handler_id.to_string(),
            source: AssetLocation {
                bucket: code_bucket.clone(),
                object_key: bundle.object_key(),
                hash: bundle.hash.clone(),
            },
            destination_bucket_id: BUCKET_ID.to_string(),
            prune: true,
            build,
            after,
        };

        let invalidation_role = HandlerRole {
            logical_id: format!("{INVALIDATION_HANDLER_ID}Role"),
            statements: vec![PolicyStatement::allow(
                &["cloudfront:CreateInvalidation", "cloudfront:GetInvalidation"],
                vec![distribution.arn()],
            )],
        };
        let invalidation_handler = HandlerFunction {
            logical_id: INVALIDATION_HANDLER_ID.to_string(),
            description: "Invalidates the distribution's cache after a deployment".to_string(),
            role_id: invalidation_role.logical_id.clone(),
            code: handler_code(handlers, INVALIDATION_HANDLER_ID, &code_bucket)?,
            runtime: "python3.12",
            timeout: Duration::from_secs(5 * 60),
            memory_mb: 128,
        };
        let invalidation = Invalidation {
            logical_id: INVALIDATION_ID.to_string(),
            handler_id: INVALIDATION_HANDLER_ID.to_string(),
            distribution_id: DISTRIBUTION_ID.to_string(),
            paths: INVALIDATION_PATHS.iter().map(|p| p.to_string()).collect(),
            caller_reference: bundle.hash.clone(),
            deployment_id: DEPLOYMENT_ID.to_string(),
        };

        let mut outputs = BTreeMap::new();
        outputs.insert(
            "Bucket".to_string(),
            Output {
                description: "Name of the site bucket".to_string(),
                value: bucket.name_ref(),
            },
        );
        outputs.insert(
            "DistributionId".to_string(),
            Output {
                description: "ID of the CloudFront distribution".to_string(),
                value: distribution.id_ref(),
            },
        );
        outputs.insert(
            "Site".to_string(),
            Output {
                description: "Domain name of the CloudFront distribution".to_string(),
                value: distribution.domain_name(),
            },
        );
        if custom_domain.is_some() {
            outputs.insert(
                "Certificate".to_string(),
                Output {
                    description: "ARN of the site certificate".to_string(),
                    value: Expr::reference(CERTIFICATE_ID),
                },
            );
            outputs.insert(
                "SiteUrl".to_string(),
                Output {
                    description: "URL of the site".to_string(),
                    value: Expr::str(format!("https://{hostname}")),
                },
            );
        }

        let stack = SiteStack {
            stack_name: config.stack_name.clone(),
            description: config.description.clone(),
            hostname,
            identity,
            bucket,
            bucket_policy,
            auto_delete,
            custom_domain,
            distribution,
            deployment_role,
            deployment_handler,
            deployment,
            invalidation_role,
            invalidation_handler,
            invalidation,
            outputs,
        };
        for resource in stack.resources() {
            naming::validate_logical_id(resource.logical_id())?;
        }
        Ok(stack)
    }

    /// Every resource, in dependency order.
    pub fn resources(&self) -> Vec<&dyn CfnResource> {
        let mut out: Vec<&dyn CfnResource> =
            vec![&self.identity, &self.bucket, &self.bucket_policy];
        if let Some(auto_delete) = &self.auto_delete {
            out.push(&auto_delete.role);
            out.push(&auto_delete.handler);
            out.push(&auto_delete.resource);
        }
        if let Some(domain) = &self.custom_domain {
            out.push(&domain.certificate);
        }
        out.push(&self.distribution);
        if let Some(domain) = &self.custom_domain {
            out.push(&domain.record);
        }
        out.push(&self.deployment_role);
        out.push(&self.deployment_handler);
        out.push(&self.deployment);
        out.push(&self.invalidation_role);
        out.push(&self.invalidation_handler);
        out.push(&self.invalidation);
        out
    }

    /// Every handler function, in dependency order.
    pub fn handler_functions(&self) -> Vec<&HandlerFunction> {
        let mut out = vec![];
        if let Some(auto_delete) = &self.auto_delete {
            out.push(&auto_delete.handler);
        }
        out.push(&self.deployment_handler);
        out.push(&self.invalidation_handler);
        out
    }

    /// Render the CloudFormation template.
    ///
    /// Fails if a resource references a logical ID that is not declared.
    pub fn to_template(&self) -> Result<Template, TemplateError> {
        let mut template = Template::new(&self.description);
        for resource in self.resources() {
            template.insert_resource(resource.logical_id(), resource.to_resource())?;
        }
        for (id, output) in &self.outputs {
            template.insert_output(id, output.clone());
        }
        template.validate_references()?;
        Ok(template)
    }
}

/// Handler functions the config needs, each with the subdirectory of
/// `handlers.source_dir` its code is read from.
pub fn required_handlers(config: &StackConfig) -> Vec<(&'static str, &'static str)> {
    let mut handlers = vec![];
    if config.bucket.auto_delete_objects {
        handlers.push((AUTO_DELETE_HANDLER_ID, "auto-delete-objects"));
    }
    handlers.push(match config.build {
        BuildMode::PreBuilt {} => (DEPLOYMENT_HANDLER_ID, "bucket-deployment"),
        BuildMode::Container(_) => (BUILD_HANDLER_ID, "deploy-time-build"),
    });
    handlers.push((INVALIDATION_HANDLER_ID, "cloudfront-invalidation"));
    handlers
}

fn handler_code(
    handlers: &HandlerBundles,
    handler_id: &str,
    code_bucket: &Expr,
) -> Result<AssetLocation, SynthError> {
    let bundle = handlers
        .get(handler_id)
        .ok_or_else(|| SynthError::HandlerCode(handler_id.to_string()))?;
    Ok(AssetLocation {
        bucket: code_bucket.clone(),
        object_key: bundle.object_key(),
        hash: bundle.hash.clone(),
    })
}

fn auto_delete_support(bucket: &Bucket, code: AssetLocation) -> AutoDelete {
    let role = HandlerRole {
        logical_id: format!("{AUTO_DELETE_HANDLER_ID}Role"),
        statements: vec![PolicyStatement::allow(
            &["s3:GetBucket*", "s3:List*", "s3:DeleteObject*", "s3:PutBucketPolicy"],
            vec![bucket.arn(), bucket.arn_for_objects()],
        )],
    };
    let handler = HandlerFunction {
        logical_id: AUTO_DELETE_HANDLER_ID.to_string(),
        description: format!("Deletes all objects in {} before the bucket is removed", bucket.name),
        role_id: role.logical_id.clone(),
        code,
        runtime: "nodejs20.x",
        timeout: Duration::from_secs(15 * 60),
        memory_mb: 128,
    };
    let resource = AutoDeleteObjects {
        logical_id: AUTO_DELETE_ID.to_string(),
        handler_id: AUTO_DELETE_HANDLER_ID.to_string(),
        bucket_id: bucket.logical_id.clone(),
        policy_id: BUCKET_POLICY_ID.to_string(),
    };
    AutoDelete {
        role,
        handler,
        resource,
    }
}

/// Warn about files a pre-built site is expected to contain.
fn check_site_files(bundle: &AssetBundle, default_root_object: &str) {
    if !bundle.contains(default_root_object) {
        warn!(
            object = default_root_object,
            dir = %bundle.source_dir.display(),
            "default root object is not in the asset directory"
        );
    }
    if !bundle.contains(ERROR_PAGE) {
        warn!(
            dir = %bundle.source_dir.display(),
            "error.html is not in the asset directory; 403s will have no body"
        );
    }
}

/// Name of the bootstrap assets bucket, with `${AWS::AccountId}` /
/// `${AWS::Region}` placeholders for whatever the environment leaves open.
pub fn bootstrap_bucket_name(env: &EnvironmentConfig) -> String {
    format!(
        "cdk-{}-assets-{}-{}",
        env.bootstrap_qualifier,
        env.account.as_deref().unwrap_or("${AWS::AccountId}"),
        env.region.as_deref().unwrap_or("${AWS::Region}"),
    )
}

fn bootstrap_bucket_expr(env: &EnvironmentConfig) -> Expr {
    let name = bootstrap_bucket_name(env);
    if name.contains("${") {
        Expr::Sub(name)
    } else {
        Expr::Str(name)
    }
}

fn bucket_arn_expr(name: &Expr) -> Expr {
    match name {
        Expr::Sub(name) => Expr::Sub(format!("arn:${{AWS::Partition}}:s3:::{name}")),
        other => Expr::concat(vec![
            Expr::Sub("arn:${AWS::Partition}:s3:::".to_string()),
            other.clone(),
        ]),
    }
}
