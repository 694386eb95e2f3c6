//! Typed declarations of every resource the site stack can contain.
//!
//! Each declaration is a plain value describing *what* should exist; the
//! [`CfnResource`] trait turns it into a template [`Resource`].
//!
//! Public access blocking, the viewer protocol policy and the 403 error
//! page are constants, not fields.

use crate::config::RemovalPolicy;
use crate::template::{Expr, Resource};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

/// Viewer protocol policy of the default cache behavior.
pub const VIEWER_PROTOCOL_POLICY: &str = "redirect-to-https";
/// Minimum TLS protocol for viewer connections on a custom certificate.
pub const MINIMUM_PROTOCOL_VERSION: &str = "TLSv1.2_2021";
pub const ALLOWED_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];
pub const CACHED_METHODS: [&str; 2] = ["GET", "HEAD"];
/// Managed "CachingOptimized" cache policy.
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
/// Hosted zone that every CloudFront alias target lives in.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";
/// Tag the auto-delete handler checks before emptying a bucket.
pub const AUTO_DELETE_TAG: &str = "aws-cdk:auto-delete-objects";

const POLICY_VERSION: &str = "2012-10-17";
const LAMBDA_BASIC_EXECUTION: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Anything that can be written into a template's `Resources` section.
pub trait CfnResource {
    fn logical_id(&self) -> &str;
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    fn depends_on(&self) -> Vec<String> {
        vec![]
    }
    fn removal_policy(&self) -> Option<RemovalPolicy> {
        None
    }
    /// One-line facts shown under the resource in CLI output.
    fn describe(&self) -> Vec<String> {
        vec![]
    }

    fn to_resource(&self) -> Resource {
        let policy = self.removal_policy().map(|p| p.as_cfn().to_string());
        Resource {
            resource_type: self.type_string().to_string(),
            properties: self.properties(),
            depends_on: self.depends_on(),
            deletion_policy: policy.clone(),
            update_replace_policy: policy,
        }
    }
}

// ============================================================================
// IAM building blocks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A CloudFront origin access identity's S3 canonical user.
    CanonicalUser(Expr),
    /// An AWS service, e.g. `lambda.amazonaws.com`.
    Service(String),
}

impl Principal {
    fn to_json(&self) -> Value {
        match self {
            Principal::CanonicalUser(id) => json!({ "CanonicalUser": id }),
            Principal::Service(service) => json!({ "Service": service }),
        }
    }
}

/// An `Allow` policy statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
    /// Set for resource policies, absent for identity policies.
    pub principal: Option<Principal>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<Expr>) -> Self {
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    fn to_json(&self) -> Value {
        let mut statement = Map::new();
        statement.insert("Effect".into(), json!("Allow"));
        statement.insert("Action".into(), one_or_many(&self.actions));
        if let Some(principal) = &self.principal {
            statement.insert("Principal".into(), principal.to_json());
        }
        let resources: Vec<Value> = self.resources.iter().map(Expr::to_json).collect();
        statement.insert(
            "Resource".into(),
            match resources.as_slice() {
                [single] => single.clone(),
                _ => Value::Array(resources),
            },
        );
        Value::Object(statement)
    }
}

fn one_or_many(items: &[String]) -> Value {
    match items {
        [single] => json!(single),
        _ => json!(items),
    }
}

fn policy_document(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
    })
}

// ============================================================================
// Access identity, bucket, bucket policy
// ============================================================================

/// CloudFront origin access identity used to read the private bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessIdentity {
    pub logical_id: String,
    pub comment: String,
}

impl AccessIdentity {
    /// The identity's S3 canonical user ID, used as bucket-policy principal.
    pub fn canonical_user(&self) -> Expr {
        Expr::att(&self.logical_id, "S3CanonicalUserId")
    }

    /// `origin-access-identity/cloudfront/<id>` as expected by an S3 origin.
    pub fn origin_path(&self) -> Expr {
        Expr::concat(vec![
            Expr::str("origin-access-identity/cloudfront/"),
            Expr::reference(&self.logical_id),
        ])
    }
}

impl CfnResource for AccessIdentity {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }
    fn properties(&self) -> Value {
        json!({ "CloudFrontOriginAccessIdentityConfig": { "Comment": self.comment } })
    }
    fn describe(&self) -> Vec<String> {
        vec![format!("Comment: {}", self.comment)]
    }
}

/// The private bucket holding the site's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub logical_id: String,
    pub name: String,
    pub removal_policy: RemovalPolicy,
    pub auto_delete_objects: bool,
}

impl Bucket {
    pub fn arn(&self) -> Expr {
        Expr::att(&self.logical_id, "Arn")
    }

    /// ARN matching every object in the bucket: `<arn>/*`.
    pub fn arn_for_objects(&self) -> Expr {
        Expr::concat(vec![self.arn(), Expr::str("/*")])
    }

    pub fn name_ref(&self) -> Expr {
        Expr::reference(&self.logical_id)
    }
}

impl CfnResource for Bucket {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> Value {
        let mut props = json!({
            "BucketName": self.name,
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
        });
        if self.auto_delete_objects {
            props["Tags"] = json!([{ "Key": AUTO_DELETE_TAG, "Value": "true" }]);
        }
        props
    }
    fn removal_policy(&self) -> Option<RemovalPolicy> {
        Some(self.removal_policy)
    }
    fn describe(&self) -> Vec<String> {
        let teardown = match (self.removal_policy, self.auto_delete_objects) {
            (RemovalPolicy::Destroy, true) => "destroy, auto-delete objects",
            (RemovalPolicy::Destroy, false) => "destroy",
            (RemovalPolicy::Retain, _) => "retain",
        };
        vec![
            format!("Name: {}", self.name),
            "Public access: blocked".to_string(),
            format!("Teardown: {teardown}"),
        ]
    }
}

/// Resource policy attached to the site bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
    pub logical_id: String,
    pub bucket_id: String,
    pub statements: Vec<PolicyStatement>,
}

impl CfnResource for BucketPolicy {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> Value {
        json!({
            "Bucket": Expr::reference(&self.bucket_id),
            "PolicyDocument": policy_document(&self.statements),
        })
    }
    fn describe(&self) -> Vec<String> {
        self.statements
            .iter()
            .map(|s| format!("Allow {} on {}", s.actions.join(", "), render_list(&s.resources)))
            .collect()
    }
}

fn render_list(items: &[Expr]) -> String {
    items
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Handler functions backing custom resources
// ============================================================================

/// Execution role of a handler function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRole {
    pub logical_id: String,
    pub statements: Vec<PolicyStatement>,
}

impl CfnResource for HandlerRole {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> Value {
        let assume = PolicyStatement::allow(&["sts:AssumeRole"], vec![])
            .with_principal(Principal::Service("lambda.amazonaws.com".into()));
        let mut assume_json = assume.to_json();
        if let Value::Object(map) = &mut assume_json {
            map.remove("Resource");
        }
        json!({
            "AssumeRolePolicyDocument": {
                "Version": POLICY_VERSION,
                "Statement": [assume_json],
            },
            "ManagedPolicyArns": [LAMBDA_BASIC_EXECUTION],
            "Policies": [{
                "PolicyName": format!("{}Policy", self.logical_id),
                "PolicyDocument": policy_document(&self.statements),
            }],
        })
    }
    fn describe(&self) -> Vec<String> {
        self.statements
            .iter()
            .map(|s| format!("Allow {}", s.actions.join(", ")))
            .collect()
    }
}

/// A Lambda function whose code bundle is published in the bootstrap
/// assets bucket alongside the site bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFunction {
    pub logical_id: String,
    pub description: String,
    pub role_id: String,
    pub code: AssetLocation,
    pub runtime: &'static str,
    pub timeout: Duration,
    pub memory_mb: u32,
}

impl CfnResource for HandlerFunction {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> Value {
        json!({
            "Code": { "S3Bucket": self.code.bucket, "S3Key": self.code.object_key },
            "Description": self.description,
            "Handler": "index.handler",
            "MemorySize": self.memory_mb,
            "Role": Expr::att(&self.role_id, "Arn"),
            "Runtime": self.runtime,
            "Timeout": self.timeout.as_secs(),
        })
    }
    fn depends_on(&self) -> Vec<String> {
        vec![self.role_id.clone()]
    }
    fn describe(&self) -> Vec<String> {
        vec![
            format!("Code: {}/{}", self.code.bucket, self.code.object_key),
            format!("Runtime: {}", self.runtime),
        ]
    }
}

/// Custom resource that empties the bucket before it is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDeleteObjects {
    pub logical_id: String,
    pub handler_id: String,
    pub bucket_id: String,
    pub policy_id: String,
}

impl CfnResource for AutoDeleteObjects {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "Custom::S3AutoDeleteObjects"
    }
    fn properties(&self) -> Value {
        json!({
            "ServiceToken": Expr::att(&self.handler_id, "Arn"),
            "BucketName": Expr::reference(&self.bucket_id),
        })
    }
    fn depends_on(&self) -> Vec<String> {
        vec![self.policy_id.clone()]
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Custom error page mapping for one HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub http_status: u16,
    pub response_http_status: u16,
    pub response_page_path: String,
    pub ttl: Duration,
}

impl ErrorResponse {
    /// 403 from the private origin → `/error.html`, cached for 30 minutes.
    pub fn forbidden_page() -> Self {
        Self {
            http_status: 403,
            response_http_status: 403,
            response_page_path: "/error.html".to_string(),
            ttl: Duration::from_secs(30 * 60),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "ErrorCachingMinTTL": self.ttl.as_secs(),
            "ErrorCode": self.http_status,
            "ResponseCode": self.response_http_status,
            "ResponsePagePath": self.response_page_path,
        })
    }
}

/// Custom domain attached to the distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionDomain {
    pub alias: String,
    pub certificate_id: String,
}

/// CloudFront distribution fronting the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub logical_id: String,
    pub default_root_object: String,
    pub minimum_protocol_version: &'static str,
    pub error_responses: Vec<ErrorResponse>,
    pub origin_id: String,
    pub bucket_id: String,
    pub identity: AccessIdentity,
    pub compress: bool,
    pub domain: Option<DistributionDomain>,
}

impl Distribution {
    pub fn id_ref(&self) -> Expr {
        Expr::reference(&self.logical_id)
    }

    pub fn domain_name(&self) -> Expr {
        Expr::att(&self.logical_id, "DomainName")
    }

    pub fn arn(&self) -> Expr {
        Expr::concat(vec![
            Expr::Sub("arn:${AWS::Partition}:cloudfront::${AWS::AccountId}:distribution/".into()),
            self.id_ref(),
        ])
    }

    fn viewer_certificate(&self) -> Value {
        match &self.domain {
            Some(domain) => json!({
                "AcmCertificateArn": Expr::reference(&domain.certificate_id),
                "MinimumProtocolVersion": self.minimum_protocol_version,
                "SslSupportMethod": "sni-only",
            }),
            None => json!({ "CloudFrontDefaultCertificate": true }),
        }
    }
}

impl CfnResource for Distribution {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> Value {
        let mut config = json!({
            "CustomErrorResponses": self.error_responses.iter().map(ErrorResponse::to_json).collect::<Vec<_>>(),
            "DefaultCacheBehavior": {
                "AllowedMethods": ALLOWED_METHODS,
                "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
                "CachedMethods": CACHED_METHODS,
                "Compress": self.compress,
                "TargetOriginId": self.origin_id,
                "ViewerProtocolPolicy": VIEWER_PROTOCOL_POLICY,
            },
            "DefaultRootObject": self.default_root_object,
            "Enabled": true,
            "HttpVersion": "http2",
            "IPV6Enabled": true,
            "Origins": [{
                "DomainName": Expr::att(&self.bucket_id, "RegionalDomainName"),
                "Id": self.origin_id,
                "S3OriginConfig": { "OriginAccessIdentity": self.identity.origin_path() },
            }],
            "ViewerCertificate": self.viewer_certificate(),
        });
        if let Some(domain) = &self.domain {
            config["Aliases"] = json!([domain.alias]);
        }
        json!({ "DistributionConfig": config })
    }
    fn describe(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Default root object: {}", self.default_root_object),
            format!("Viewer protocol: {VIEWER_PROTOCOL_POLICY}"),
            format!("Methods: {}", ALLOWED_METHODS.join(", ")),
        ];
        for e in &self.error_responses {
            lines.push(format!(
                "Error {} → {} ({}s)",
                e.http_status,
                e.response_page_path,
                e.ttl.as_secs()
            ));
        }
        match &self.domain {
            Some(domain) => lines.push(format!(
                "Alias: {} (TLS {})",
                domain.alias, self.minimum_protocol_version
            )),
            None => lines.push("Certificate: CloudFront default".to_string()),
        }
        lines
    }
}

// ============================================================================
// Custom domain
// ============================================================================

/// DNS-validated ACM certificate for the site hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub logical_id: String,
    pub domain_name: String,
    pub hosted_zone_id: String,
}

impl CfnResource for Certificate {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }
    fn properties(&self) -> Value {
        json!({
            "DomainName": self.domain_name,
            "DomainValidationOptions": [{
                "DomainName": self.domain_name,
                "HostedZoneId": self.hosted_zone_id,
            }],
            "ValidationMethod": "DNS",
        })
    }
    fn describe(&self) -> Vec<String> {
        vec![format!("Domain: {} (DNS validation)", self.domain_name)]
    }
}

/// `A` alias record pointing the hostname at the distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub logical_id: String,
    pub name: String,
    pub hosted_zone_id: String,
    pub distribution_id: String,
}

impl CfnResource for AliasRecord {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }
    fn properties(&self) -> Value {
        json!({
            "AliasTarget": {
                "DNSName": Expr::att(&self.distribution_id, "DomainName"),
                "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
            },
            "HostedZoneId": self.hosted_zone_id,
            "Name": format!("{}.", self.name),
            "Type": "A",
        })
    }
    fn describe(&self) -> Vec<String> {
        vec![format!("A {} → distribution", self.name)]
    }
}

// ============================================================================
// Deployment
// ============================================================================

/// Where a staged bundle is uploaded by the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    pub bucket: Expr,
    pub object_key: String,
    /// Content hash of the bundle.
    pub hash: String,
}

/// Extra settings for a deploy-time build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub install_commands: Vec<String>,
    pub build_commands: Vec<String>,
    pub output_dir: String,
    pub environment: BTreeMap<String, String>,
}

/// Copies the asset bundle into the site bucket, optionally building it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentAction {
    pub logical_id: String,
    pub handler_id: String,
    pub source: AssetLocation,
    pub destination_bucket_id: String,
    /// Delete objects in the bucket that are not part of the bundle.
    pub prune: bool,
    pub build: Option<BuildSpec>,
    pub after: Vec<String>,
}

impl CfnResource for DeploymentAction {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        match self.build {
            Some(_) => "Custom::DeployTimeBuild",
            None => "Custom::CDKBucketDeployment",
        }
    }
    fn properties(&self) -> Value {
        let mut props = json!({
            "ServiceToken": Expr::att(&self.handler_id, "Arn"),
            "SourceBucketNames": [self.source.bucket],
            "SourceObjectKeys": [self.source.object_key],
            "DestinationBucketName": Expr::reference(&self.destination_bucket_id),
            "Prune": self.prune,
        });
        if let Some(build) = &self.build {
            props["InstallCommands"] = json!(build.install_commands);
            props["BuildCommands"] = json!(build.build_commands);
            props["OutputSourceDirectory"] = json!(build.output_dir);
            props["BuildEnvironment"] = json!(build.environment);
        }
        props
    }
    fn depends_on(&self) -> Vec<String> {
        self.after.clone()
    }
    fn describe(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Source: {}/{}",
            self.source.bucket, self.source.object_key
        )];
        if let Some(build) = &self.build {
            lines.push(format!("Build: {}", build.build_commands.join(" && ")));
            lines.push(format!("Output: {}", build.output_dir));
            for key in build.environment.keys() {
                lines.push(format!("Env: {key}"));
            }
        }
        lines
    }
}

/// Cache invalidation issued once the deployment has finished, served by
/// its own handler function.
///
/// `caller_reference` is the bundle hash, so any content change alters the
/// resource's properties and the engine re-runs the invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub logical_id: String,
    pub handler_id: String,
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub caller_reference: String,
    pub deployment_id: String,
}

impl CfnResource for Invalidation {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "Custom::CloudFrontInvalidation"
    }
    fn properties(&self) -> Value {
        json!({
            "ServiceToken": Expr::att(&self.handler_id, "Arn"),
            "DistributionId": Expr::reference(&self.distribution_id),
            "Paths": self.paths,
            "CallerReference": self.caller_reference,
        })
    }
    fn depends_on(&self) -> Vec<String> {
        vec![self.deployment_id.clone()]
    }
    fn describe(&self) -> Vec<String> {
        vec![
            format!("Paths: {}", self.paths.join(", ")),
            format!("After: {}", self.deployment_id),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> AccessIdentity {
        AccessIdentity {
            logical_id: "CloudfrontOAI".into(),
            comment: "OAI for StaticSiteStack".into(),
        }
    }

    fn bucket(auto_delete: bool) -> Bucket {
        Bucket {
            logical_id: "SiteBucket".into(),
            name: "app.example.com".into(),
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: auto_delete,
        }
    }

    fn distribution(domain: Option<DistributionDomain>) -> Distribution {
        Distribution {
            logical_id: "SiteDistribution".into(),
            default_root_object: "chatmodel.html".into(),
            minimum_protocol_version: MINIMUM_PROTOCOL_VERSION,
            error_responses: vec![ErrorResponse::forbidden_page()],
            origin_id: "SiteBucketOrigin".into(),
            bucket_id: "SiteBucket".into(),
            identity: identity(),
            compress: true,
            domain,
        }
    }

    #[test]
    fn bucket_blocks_all_public_access() {
        let props = bucket(false).properties();
        let block = &props["PublicAccessBlockConfiguration"];
        for key in [
            "BlockPublicAcls",
            "BlockPublicPolicy",
            "IgnorePublicAcls",
            "RestrictPublicBuckets",
        ] {
            assert_eq!(block[key], true, "{key}");
        }
        assert!(props.get("Tags").is_none());
    }

    #[test]
    fn bucket_auto_delete_adds_tag() {
        let props = bucket(true).properties();
        assert_eq!(props["Tags"][0]["Key"], AUTO_DELETE_TAG);
    }

    #[test]
    fn bucket_resource_carries_removal_policy() {
        let resource = bucket(true).to_resource();
        assert_eq!(resource.deletion_policy.as_deref(), Some("Delete"));
        assert_eq!(resource.update_replace_policy.as_deref(), Some("Delete"));

        let mut retained = bucket(false);
        retained.removal_policy = RemovalPolicy::Retain;
        assert_eq!(
            retained.to_resource().deletion_policy.as_deref(),
            Some("Retain")
        );
    }

    #[test]
    fn bucket_policy_statement_shape() {
        let b = bucket(false);
        let policy = BucketPolicy {
            logical_id: "SiteBucketPolicy".into(),
            bucket_id: b.logical_id.clone(),
            statements: vec![
                PolicyStatement::allow(&["s3:GetObject"], vec![b.arn_for_objects()])
                    .with_principal(Principal::CanonicalUser(identity().canonical_user())),
            ],
        };
        let props = policy.properties();
        let statement = &props["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], "s3:GetObject");
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(
            statement["Principal"],
            json!({ "CanonicalUser": { "Fn::GetAtt": ["CloudfrontOAI", "S3CanonicalUserId"] } })
        );
        assert_eq!(
            statement["Resource"],
            json!({ "Fn::Join": ["", [{ "Fn::GetAtt": ["SiteBucket", "Arn"] }, "/*"]] })
        );
    }

    #[test]
    fn forbidden_page_maps_to_error_html_for_thirty_minutes() {
        let e = ErrorResponse::forbidden_page();
        assert_eq!(e.http_status, 403);
        assert_eq!(e.response_page_path, "/error.html");
        assert_eq!(e.ttl, Duration::from_secs(1800));
    }

    #[test]
    fn distribution_without_domain_uses_default_certificate() {
        let props = distribution(None).properties();
        let config = &props["DistributionConfig"];
        assert_eq!(config["ViewerCertificate"]["CloudFrontDefaultCertificate"], true);
        assert!(config.get("Aliases").is_none());
        assert_eq!(
            config["DefaultCacheBehavior"]["ViewerProtocolPolicy"],
            "redirect-to-https"
        );
        assert_eq!(
            config["DefaultCacheBehavior"]["AllowedMethods"],
            json!(["GET", "HEAD", "OPTIONS"])
        );
        assert_eq!(config["DefaultCacheBehavior"]["Compress"], true);
        assert_eq!(config["CustomErrorResponses"][0]["ErrorCachingMinTTL"], 1800);
        assert_eq!(
            config["Origins"][0]["S3OriginConfig"]["OriginAccessIdentity"],
            json!({ "Fn::Join": ["", ["origin-access-identity/cloudfront/", { "Ref": "CloudfrontOAI" }]] })
        );
    }

    #[test]
    fn distribution_with_domain_pins_tls() {
        let props = distribution(Some(DistributionDomain {
            alias: "app.example.com".into(),
            certificate_id: "SiteCertificate".into(),
        }))
        .properties();
        let config = &props["DistributionConfig"];
        assert_eq!(config["Aliases"], json!(["app.example.com"]));
        assert_eq!(
            config["ViewerCertificate"]["MinimumProtocolVersion"],
            "TLSv1.2_2021"
        );
        assert_eq!(
            config["ViewerCertificate"]["AcmCertificateArn"],
            json!({ "Ref": "SiteCertificate" })
        );
    }

    #[test]
    fn handler_role_trusts_lambda_without_resource_key() {
        let role = HandlerRole {
            logical_id: "HandlerRole".into(),
            statements: vec![PolicyStatement::allow(
                &["cloudfront:CreateInvalidation", "cloudfront:GetInvalidation"],
                vec![Expr::str("*")],
            )],
        };
        let props = role.properties();
        let trust = &props["AssumeRolePolicyDocument"]["Statement"][0];
        assert_eq!(trust["Principal"]["Service"], "lambda.amazonaws.com");
        assert!(trust.get("Resource").is_none());
        let inline = &props["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(inline["Resource"], "*");
        assert_eq!(inline["Action"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn alias_record_targets_cloudfront_zone() {
        let record = AliasRecord {
            logical_id: "SiteAliasRecord".into(),
            name: "app.example.com".into(),
            hosted_zone_id: "Z0ABC".into(),
            distribution_id: "SiteDistribution".into(),
        };
        let props = record.properties();
        assert_eq!(props["Name"], "app.example.com.");
        assert_eq!(props["AliasTarget"]["HostedZoneId"], CLOUDFRONT_HOSTED_ZONE_ID);
    }

    #[test]
    fn invalidation_depends_on_deployment() {
        let inv = Invalidation {
            logical_id: "SiteInvalidation".into(),
            handler_id: "InvalidationHandler".into(),
            distribution_id: "SiteDistribution".into(),
            paths: vec!["/*".into()],
            caller_reference: "abc".into(),
            deployment_id: "DeployWithInvalidation".into(),
        };
        let resource = inv.to_resource();
        assert_eq!(resource.depends_on, vec!["DeployWithInvalidation"]);
        assert_eq!(resource.properties["Paths"], json!(["/*"]));
    }

    fn code(key: &str) -> AssetLocation {
        AssetLocation {
            bucket: Expr::str("cdk-hnb659fds-assets-123456789012-us-east-1"),
            object_key: key.into(),
            hash: "abc".into(),
        }
    }

    #[test]
    fn handler_function_code_comes_from_its_bundle() {
        let handler = HandlerFunction {
            logical_id: "InvalidationHandler".into(),
            description: "Invalidates the distribution".into(),
            role_id: "InvalidationHandlerRole".into(),
            code: code("abc.zip"),
            runtime: "python3.12",
            timeout: Duration::from_secs(300),
            memory_mb: 128,
        };
        let resource = handler.to_resource();
        assert_eq!(
            resource.properties["Code"],
            json!({
                "S3Bucket": "cdk-hnb659fds-assets-123456789012-us-east-1",
                "S3Key": "abc.zip",
            })
        );
        assert_eq!(
            resource.properties["Role"],
            json!({ "Fn::GetAtt": ["InvalidationHandlerRole", "Arn"] })
        );
        assert_eq!(resource.depends_on, vec!["InvalidationHandlerRole"]);
    }

    #[test]
    fn deployment_leaves_invalidation_to_its_own_resource() {
        let deployment = DeploymentAction {
            logical_id: "DeployWithInvalidation".into(),
            handler_id: "BucketDeploymentHandler".into(),
            source: code("site.zip"),
            destination_bucket_id: "SiteBucket".into(),
            prune: true,
            build: None,
            after: vec!["SiteBucketPolicy".into()],
        };
        let props = deployment.properties();
        assert!(props.get("DistributionId").is_none());
        assert!(props.get("DistributionPaths").is_none());
        assert_eq!(props["SourceObjectKeys"], json!(["site.zip"]));
        assert_eq!(deployment.type_string(), "Custom::CDKBucketDeployment");
    }

    #[test]
    fn distribution_arn_is_scoped_to_its_id() {
        assert_eq!(
            distribution(None).arn().to_json(),
            json!({ "Fn::Join": ["", [
                { "Fn::Sub": "arn:${AWS::Partition}:cloudfront::${AWS::AccountId}:distribution/" },
                { "Ref": "SiteDistribution" },
            ]] })
        );
    }
}
