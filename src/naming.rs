//! Name derivation and validation for everything the stack declares.
//!
//! The site hostname is the single source of naming truth: it becomes the
//! bucket name, the certificate domain and the alias record. Because the
//! bucket name is global across all accounts, it has to satisfy the S3
//! general-purpose bucket rules before anything is declared:
//!
//! - 3 to 63 characters
//! - lowercase ASCII letters, digits, `.` and `-` only
//! - starts and ends with a letter or digit
//! - no two adjacent periods, no `.-` or `-.`
//! - not formatted like an IPv4 address
//! - no reserved prefixes (`xn--`, `sthree-`, `amzn-s3-demo-`) or
//!   suffixes (`-s3alias`, `--ol-s3`, `.mrap`, `--x-s3`, `--table-s3`)
//!
//! Stack names, logical IDs, account IDs and region codes are checked here
//! too so every "is this a valid name" question has one home.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} '{value}' must not start or end with '.'")]
    DanglingDot { field: &'static str, value: String },
    #[error("bucket name '{name}' is {len} characters; must be between 3 and 63")]
    BucketLength { name: String, len: usize },
    #[error("bucket name '{name}' has invalid character '{ch}' at position {position}")]
    BucketCharacter {
        name: String,
        ch: char,
        position: usize,
    },
    #[error("bucket name '{0}' must start and end with a lowercase letter or digit")]
    BucketBoundary(String),
    #[error("bucket name '{0}' must not contain '..', '.-' or '-.'")]
    BucketSeparators(String),
    #[error("bucket name '{0}' must not be formatted as an IP address")]
    BucketIpAddress(String),
    #[error("bucket name '{name}' uses reserved affix '{affix}'")]
    BucketReserved { name: String, affix: &'static str },
    #[error("stack name '{0}' must start with a letter, use only letters, digits and '-', and be at most 128 characters")]
    StackName(String),
    #[error("logical ID '{0}' must be alphanumeric and at most 255 characters")]
    LogicalId(String),
    #[error("account '{0}' must be exactly 12 digits")]
    Account(String),
    #[error("region '{0}' is not a valid region code (e.g. us-east-1)")]
    Region(String),
}

const RESERVED_PREFIXES: &[&str] = &["xn--", "sthree-", "amzn-s3-demo-"];
const RESERVED_SUFFIXES: &[&str] = &["-s3alias", "--ol-s3", ".mrap", "--x-s3", "--table-s3"];

/// Join subdomain and domain into the fully-qualified site hostname.
///
/// - `("app", "example.com")` → `"app.example.com"`
/// - `("docs.eu", "example.com")` → `"docs.eu.example.com"`
///
/// Both parts must be non-empty and must not carry their own leading or
/// trailing dot, otherwise the join would produce `..` or a dangling dot.
pub fn site_hostname(site_sub_domain: &str, domain_name: &str) -> Result<String, NamingError> {
    check_part("site.site_sub_domain", site_sub_domain)?;
    check_part("site.domain_name", domain_name)?;
    Ok(format!("{site_sub_domain}.{domain_name}"))
}

fn check_part(field: &'static str, value: &str) -> Result<(), NamingError> {
    if value.is_empty() {
        return Err(NamingError::Empty(field));
    }
    if value.starts_with('.') || value.ends_with('.') {
        return Err(NamingError::DanglingDot {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validate a name against the S3 general-purpose bucket naming rules.
pub fn validate_bucket_name(name: &str) -> Result<(), NamingError> {
    let len = name.len();
    if !(3..=63).contains(&len) {
        return Err(NamingError::BucketLength {
            name: name.to_string(),
            len,
        });
    }
    for (i, ch) in name.chars().enumerate() {
        if !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' || ch == '-') {
            return Err(NamingError::BucketCharacter {
                name: name.to_string(),
                ch,
                position: i + 1,
            });
        }
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(NamingError::BucketBoundary(name.to_string()));
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return Err(NamingError::BucketSeparators(name.to_string()));
    }
    if looks_like_ipv4(name) {
        return Err(NamingError::BucketIpAddress(name.to_string()));
    }
    if let Some(affix) = RESERVED_PREFIXES.iter().copied().find(|p| name.starts_with(p)) {
        return Err(NamingError::BucketReserved {
            name: name.to_string(),
            affix,
        });
    }
    if let Some(affix) = RESERVED_SUFFIXES.iter().copied().find(|s| name.ends_with(s)) {
        return Err(NamingError::BucketReserved {
            name: name.to_string(),
            affix,
        });
    }
    Ok(())
}

fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.chars().all(|c| c.is_ascii_digit()))
}

/// Validate a CloudFormation stack name: `[A-Za-z][A-Za-z0-9-]*`, max 128.
pub fn validate_stack_name(name: &str) -> Result<(), NamingError> {
    let starts_alpha = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let body_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !starts_alpha || !body_ok || name.len() > 128 {
        return Err(NamingError::StackName(name.to_string()));
    }
    Ok(())
}

/// Validate a template logical ID: non-empty, ASCII alphanumeric, max 255.
pub fn validate_logical_id(id: &str) -> Result<(), NamingError> {
    if id.is_empty() || id.len() > 255 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(NamingError::LogicalId(id.to_string()));
    }
    Ok(())
}

pub fn validate_account(account: &str) -> Result<(), NamingError> {
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(NamingError::Account(account.to_string()));
    }
    Ok(())
}

/// Validate a region code shaped like `us-east-1` or `ap-southeast-2`.
///
/// At least three dash-separated parts, lowercase letters in all but the
/// last, and a numeric last part. Partition-specific forms such as
/// `us-gov-west-1` pass because they follow the same shape.
pub fn validate_region(region: &str) -> Result<(), NamingError> {
    let parts: Vec<&str> = region.split('-').collect();
    let Some((last, head)) = parts.split_last() else {
        return Err(NamingError::Region(region.to_string()));
    };
    let ok = parts.len() >= 3
        && !last.is_empty()
        && last.chars().all(|c| c.is_ascii_digit())
        && head
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()));
    if !ok {
        return Err(NamingError::Region(region.to_string()));
    }
    Ok(())
}
