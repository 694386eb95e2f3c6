//! CloudFormation template model.
//!
//! A [`Template`] is the serialized form of a stack: resources keyed by
//! logical ID, plus outputs. Both maps are `BTreeMap`s so the JSON is
//! byte-for-byte stable across runs; re-synthesizing identical input must
//! produce an identical file.
//!
//! Values that are only known at deploy time are written with intrinsic
//! functions, modelled by [`Expr`]:
//!
//! | Variant | JSON |
//! |---------|------|
//! | `Str("a")` | `"a"` |
//! | `Ref("Id")` | `{"Ref": "Id"}` |
//! | `GetAtt("Id", "Arn")` | `{"Fn::GetAtt": ["Id", "Arn"]}` |
//! | `Join("", [..])` | `{"Fn::Join": ["", [..]]}` |
//! | `Sub("${AWS::Region}")` | `{"Fn::Sub": "${AWS::Region}"}` |

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{from} references undeclared resource '{target}'")]
    DanglingReference { from: String, target: String },
    #[error("{from} depends on undeclared resource '{target}'")]
    DanglingDependency { from: String, target: String },
    #[error("logical ID '{0}' is declared twice")]
    DuplicateLogicalId(String),
}

/// A template value that may be resolved at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Str(String),
    Ref(String),
    GetAtt(String, String),
    Join(String, Vec<Expr>),
    Sub(String),
}

impl Expr {
    pub fn str(s: impl Into<String>) -> Self {
        Expr::Str(s.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Expr::Ref(logical_id.into())
    }

    pub fn att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Expr::GetAtt(logical_id.into(), attribute.into())
    }

    /// Concatenate parts with no separator.
    pub fn concat(parts: Vec<Expr>) -> Self {
        Expr::Join(String::new(), parts)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expr::Str(s) => serializer.serialize_str(s),
            Expr::Ref(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", id)?;
                map.end()
            }
            Expr::GetAtt(id, attribute) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &[id, attribute])?;
                map.end()
            }
            Expr::Join(separator, parts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Join", &(separator, parts))?;
                map.end()
            }
            Expr::Sub(template) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Sub", template)?;
                map.end()
            }
        }
    }
}

/// Short YAML-ish rendering used in CLI output.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Str(s) => write!(f, "{s}"),
            Expr::Ref(id) => write!(f, "!Ref {id}"),
            Expr::GetAtt(id, attribute) => write!(f, "!GetAtt {id}.{attribute}"),
            Expr::Join(separator, parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(separator))
            }
            Expr::Sub(template) => write!(f, "!Sub {template}"),
        }
    }
}

/// One entry of the `Resources` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

/// One entry of the `Outputs` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub description: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub resources: BTreeMap<String, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource. A logical ID may only be declared once.
    pub fn insert_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: Resource,
    ) -> Result<(), TemplateError> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(TemplateError::DuplicateLogicalId(logical_id));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    pub fn insert_output(&mut self, id: impl Into<String>, output: Output) {
        self.outputs.insert(id.into(), output);
    }

    /// Check that every `Ref`, `Fn::GetAtt` and `DependsOn` target is
    /// declared in this template. Pseudo parameters (`AWS::*`) are exempt.
    pub fn validate_references(&self) -> Result<(), TemplateError> {
        for (id, resource) in &self.resources {
            for target in collect_references(&resource.properties) {
                if !self.resources.contains_key(&target) {
                    return Err(TemplateError::DanglingReference {
                        from: id.clone(),
                        target,
                    });
                }
            }
            for target in &resource.depends_on {
                if !self.resources.contains_key(target) {
                    return Err(TemplateError::DanglingDependency {
                        from: id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        for (id, output) in &self.outputs {
            for target in collect_references(&output.value.to_json()) {
                if !self.resources.contains_key(&target) {
                    return Err(TemplateError::DanglingReference {
                        from: format!("output {id}"),
                        target,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Logical IDs referenced by `Ref` / `Fn::GetAtt` anywhere inside `value`.
pub fn collect_references(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk(value, &mut out);
    out
}

fn walk(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(id)) = map.get("Ref") {
                    if !id.starts_with("AWS::") {
                        out.insert(id.clone());
                    }
                    return;
                }
                if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(id)) = parts.first() {
                        out.insert(id.clone());
                    }
                    return;
                }
            }
            for v in map.values() {
                walk(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                walk(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket() -> Resource {
        Resource {
            resource_type: "AWS::S3::Bucket".into(),
            properties: json!({ "BucketName": "app.example.com" }),
            depends_on: vec![],
            deletion_policy: Some("Delete".into()),
            update_replace_policy: Some("Delete".into()),
        }
    }

    #[test]
    fn expr_serializes_intrinsics() {
        assert_eq!(Expr::str("a").to_json(), json!("a"));
        assert_eq!(Expr::reference("B").to_json(), json!({ "Ref": "B" }));
        assert_eq!(
            Expr::att("B", "Arn").to_json(),
            json!({ "Fn::GetAtt": ["B", "Arn"] })
        );
        assert_eq!(
            Expr::concat(vec![Expr::att("B", "Arn"), Expr::str("/*")]).to_json(),
            json!({ "Fn::Join": ["", [{ "Fn::GetAtt": ["B", "Arn"] }, "/*"]] })
        );
        assert_eq!(
            Expr::Sub("${AWS::Region}".into()).to_json(),
            json!({ "Fn::Sub": "${AWS::Region}" })
        );
    }

    #[test]
    fn expr_display_is_short_form() {
        assert_eq!(Expr::reference("SiteBucket").to_string(), "!Ref SiteBucket");
        assert_eq!(
            Expr::att("SiteDistribution", "DomainName").to_string(),
            "!GetAtt SiteDistribution.DomainName"
        );
        assert_eq!(
            Expr::concat(vec![Expr::str("https://"), Expr::str("app.example.com")]).to_string(),
            "https://app.example.com"
        );
    }

    #[test]
    fn resource_serializes_pascal_case_and_skips_empty() {
        let value = serde_json::to_value(bucket()).unwrap();
        assert_eq!(value["Type"], "AWS::S3::Bucket");
        assert_eq!(value["DeletionPolicy"], "Delete");
        assert!(value.get("DependsOn").is_none());
    }

    #[test]
    fn template_header() {
        let template = Template::new("demo");
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Description"], "demo");
        assert!(value.get("Outputs").is_none());
    }

    #[test]
    fn duplicate_logical_id_rejected() {
        let mut template = Template::new("demo");
        template.insert_resource("SiteBucket", bucket()).unwrap();
        assert_eq!(
            template.insert_resource("SiteBucket", bucket()),
            Err(TemplateError::DuplicateLogicalId("SiteBucket".into()))
        );
    }

    #[test]
    fn collect_references_finds_nested_and_skips_pseudo() {
        let value = json!({
            "A": { "Ref": "SiteBucket" },
            "B": [{ "Fn::GetAtt": ["SiteDistribution", "DomainName"] }],
            "C": { "Ref": "AWS::Region" },
        });
        let refs: Vec<String> = collect_references(&value).into_iter().collect();
        assert_eq!(refs, vec!["SiteBucket", "SiteDistribution"]);
    }

    #[test]
    fn validate_references_reports_dangling_ref() {
        let mut template = Template::new("demo");
        let mut policy = bucket();
        policy.properties = json!({ "Bucket": { "Ref": "Missing" } });
        template.insert_resource("Policy", policy).unwrap();
        assert_eq!(
            template.validate_references(),
            Err(TemplateError::DanglingReference {
                from: "Policy".into(),
                target: "Missing".into(),
            })
        );
    }

    #[test]
    fn validate_references_reports_dangling_dependency() {
        let mut template = Template::new("demo");
        let mut res = bucket();
        res.depends_on = vec!["Ghost".into()];
        template.insert_resource("SiteBucket", res).unwrap();
        assert!(matches!(
            template.validate_references(),
            Err(TemplateError::DanglingDependency { .. })
        ));
    }

    #[test]
    fn validate_references_checks_outputs() {
        let mut template = Template::new("demo");
        template.insert_output(
            "Bucket",
            Output {
                description: "bucket".into(),
                value: Expr::reference("SiteBucket"),
            },
        );
        assert!(template.validate_references().is_err());
        template.insert_resource("SiteBucket", bucket()).unwrap();
        assert!(template.validate_references().is_ok());
    }
}
