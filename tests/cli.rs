//! End-to-end tests for the site-stack CLI.
//!
//! Each test copies `fixtures/site` into a fresh temp directory and runs the
//! compiled binary against it.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn copy_dir_recursive(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_dir_recursive(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn fixture_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path());
    tmp
}

/// A site-stack command running inside `dir` with a clean environment.
#[allow(deprecated)]
fn site_stack(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("site-stack").unwrap();
    cmd.current_dir(dir.path());
    cmd.env_remove("SITE_STACK_ACCOUNT");
    cmd.env_remove("SITE_STACK_REGION");
    cmd.env_remove("SITE_STACK_LOG");
    cmd
}

#[test]
fn test_gen_config_prints_documented_toml() {
    let tmp = TempDir::new().unwrap();
    site_stack(&tmp)
        .arg("gen-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[site]"))
        .stdout(predicate::str::contains("removal_policy = \"destroy\""))
        .stdout(predicate::str::contains("LAMBDA_MODEL_INVOKE_HOST"));
}

#[test]
fn test_check_prints_plan_and_writes_nothing() {
    let tmp = fixture_project();
    site_stack(&tmp)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stack StaticSiteStack → app.example.com"))
        .stdout(predicate::str::contains("SiteBucketPolicy (AWS::S3::BucketPolicy)"))
        .stdout(predicate::str::contains("Stack is valid"));
    assert!(!tmp.path().join("cdk.out").exists());
}

#[test]
fn test_synth_writes_cloud_assembly() {
    let tmp = fixture_project();
    site_stack(&tmp)
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("Template → cdk.out/StaticSiteStack.template.json"))
        .stdout(predicate::str::contains("Synth complete"));

    let out = tmp.path().join("cdk.out");
    for file in [
        "StaticSiteStack.template.json",
        "StaticSiteStack.assets.json",
        "manifest.json",
    ] {
        assert!(out.join(file).exists(), "{file} should exist");
    }
    let staged: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("asset."))
        .collect();
    // Site bundle plus auto-delete, deployment and invalidation handlers.
    assert_eq!(staged.len(), 4);
    assert!(
        staged
            .iter()
            .any(|dir| out.join(dir).join("chatmodel.html").exists())
    );

    let template: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("StaticSiteStack.template.json")).unwrap())
            .unwrap();
    let assets: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("StaticSiteStack.assets.json")).unwrap())
            .unwrap();
    let published: Vec<String> = assets["files"]
        .as_object()
        .unwrap()
        .values()
        .flat_map(|f| f["destinations"].as_object().unwrap().values())
        .map(|d| d["objectKey"].as_str().unwrap().to_string())
        .collect();
    for (id, resource) in template["Resources"].as_object().unwrap() {
        if resource["Type"] == "AWS::Lambda::Function" {
            let key = resource["Properties"]["Code"]["S3Key"].as_str().unwrap();
            assert!(published.iter().any(|k| k == key), "{id} code {key} is not published");
        }
    }
}

#[test]
fn test_synth_respects_out_flag() {
    let tmp = fixture_project();
    site_stack(&tmp)
        .args(["synth", "--out", "build/assembly"])
        .assert()
        .success();
    assert!(tmp.path().join("build/assembly/manifest.json").exists());
}

#[test]
fn test_synth_missing_assets_fails_without_output() {
    let tmp = fixture_project();
    fs::remove_dir_all(tmp.path().join("src/frontend/lib")).unwrap();
    site_stack(&tmp)
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing"));
    assert!(!tmp.path().join("cdk.out").exists());
}

#[test]
fn test_misspelled_variant_key_fails() {
    let tmp = fixture_project();
    let config = fs::read_to_string(tmp.path().join("stack.toml")).unwrap();
    fs::write(
        tmp.path().join("stack.toml"),
        format!("{config}\n[dns]\nmode = \"route53\"\nhosted_zone_id = \"Z0ABC\"\nzone_nmae = \"example.com\"\n"),
    )
    .unwrap();
    site_stack(&tmp)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("zone_nmae"));
}

#[test]
fn test_check_is_quiet_by_default() {
    let tmp = fixture_project();
    site_stack(&tmp)
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("WARN").not());
}

#[test]
fn test_missing_site_names_fail() {
    let tmp = fixture_project();
    fs::remove_file(tmp.path().join("stack.toml")).unwrap();
    site_stack(&tmp).arg("check").assert().failure();
}

#[test]
fn test_site_names_from_flags() {
    let tmp = fixture_project();
    fs::remove_file(tmp.path().join("stack.toml")).unwrap();
    site_stack(&tmp)
        .args(["check", "--domain-name", "example.org", "--sub-domain", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs.example.org"))
        .stdout(predicate::str::contains("aws://unknown-account/unknown-region"));
}

#[test]
fn test_region_from_environment() {
    let tmp = fixture_project();
    site_stack(&tmp)
        .env("SITE_STACK_REGION", "eu-west-1")
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("aws://123456789012/eu-west-1"));
}

#[test]
fn test_template_is_valid_json_and_stable() {
    let tmp = fixture_project();
    let first = site_stack(&tmp).arg("template").assert().success();
    let first = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let second = site_stack(&tmp).arg("template").assert().success();
    let second = String::from_utf8(second.get_output().stdout.clone()).unwrap();
    assert_eq!(first, second);

    let template: serde_json::Value = serde_json::from_str(&first).unwrap();
    let bucket = &template["Resources"]["SiteBucket"];
    assert_eq!(bucket["Properties"]["BucketName"], "app.example.com");
    assert_eq!(
        bucket["Properties"]["PublicAccessBlockConfiguration"]["BlockPublicPolicy"],
        true
    );
    assert_eq!(
        template["Resources"]["SiteInvalidation"]["DependsOn"][0],
        "DeployWithInvalidation"
    );
}

#[test]
fn test_template_changes_with_asset_content() {
    let tmp = fixture_project();
    let before = site_stack(&tmp).arg("template").assert().success();
    let before = String::from_utf8(before.get_output().stdout.clone()).unwrap();

    fs::write(
        tmp.path().join("src/frontend/lib/assets/app.js"),
        "console.log('v2');\n",
    )
    .unwrap();
    let after = site_stack(&tmp).arg("template").assert().success();
    let after = String::from_utf8(after.get_output().stdout.clone()).unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_route53_outside_us_east_1_rejected() {
    let tmp = fixture_project();
    let config = fs::read_to_string(tmp.path().join("stack.toml")).unwrap();
    fs::write(
        tmp.path().join("stack.toml"),
        format!("{config}\n[dns]\nmode = \"route53\"\nhosted_zone_id = \"Z0ABC\"\n"),
    )
    .unwrap();

    site_stack(&tmp).arg("check").assert().success();
    site_stack(&tmp)
        .args(["check", "--region", "eu-west-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("us-east-1"));
}
