use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Worker-pool size used when `CONCURRENCY` is unset or unparsable
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Region used when neither `S3_REGION` nor `WASABI_REGION` is set
pub const DEFAULT_REGION: &str = "us-east-1";

pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";

pub const DEFAULT_ACL: &str = "public-read";

/// Configuration for a directory upload run
#[derive(Debug, Clone)]
pub struct Config {
    pub upload_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub storage: StorageConfig,
}

/// Connection and object settings for the S3-compatible store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub public_url_base: Option<String>,
    pub cache_control: String,
    pub acl: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// Values are trimmed and empty values are treated as unset. Storage
    /// variables accept the legacy `WASABI_*` names as aliases.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| {
            names.iter().find_map(|name| {
                lookup(name)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
        };

        let concurrency = get(&["CONCURRENCY"])
            .map(|raw| parse_concurrency(&raw))
            .unwrap_or(DEFAULT_CONCURRENCY);

        // An explicitly empty S3_ACL disables the ACL header
        let acl = match lookup("S3_ACL") {
            Some(v) => Some(v.trim().to_string()).filter(|v| !v.is_empty()),
            None => Some(DEFAULT_ACL.to_string()),
        };

        let storage = StorageConfig {
            endpoint: get(&["S3_ENDPOINT", "WASABI_ENDPOINT"]),
            region: get(&["S3_REGION", "WASABI_REGION"]),
            bucket: get(&["S3_BUCKET", "WASABI_BUCKET"]),
            access_key: get(&["S3_ACCESS_KEY", "WASABI_ACCESS_KEY"]),
            secret_key: get(&["S3_SECRET_KEY", "WASABI_SECRET_KEY"]),
            public_url_base: get(&["PUBLIC_URL_BASE", "CDN_URL"]),
            cache_control: get(&["S3_CACHE_CONTROL"])
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
            acl,
        };

        Self {
            upload_dir: get(&["UPLOAD_DIR"]).map(PathBuf::from),
            concurrency,
            storage,
        }
    }

    /// Resolve the root directory as an absolute path
    ///
    /// # Errors
    ///
    /// Returns an error if no root directory was configured
    pub fn root_dir(&self) -> Result<PathBuf> {
        let dir = self
            .upload_dir
            .as_ref()
            .context("UPLOAD_DIR not found in environment. Set it in .env or pass --root")?;

        std::path::absolute(dir)
            .with_context(|| format!("Failed to resolve root directory: {}", dir.display()))
    }
}

/// Parse a concurrency value, coercing anything below one up to one
pub fn parse_concurrency(raw: &str) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(n) if n < 1 => 1,
        Ok(n) => usize::try_from(n).unwrap_or(DEFAULT_CONCURRENCY),
        Err(_) => {
            warn!(
                "CONCURRENCY '{}' is not a number, using {}",
                raw, DEFAULT_CONCURRENCY
            );
            DEFAULT_CONCURRENCY
        }
    }
}

impl StorageConfig {
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn bucket(&self) -> &str {
        self.bucket.as_deref().unwrap_or_default()
    }

    /// Collect startup warnings for missing or invalid storage settings
    ///
    /// None of these are fatal: uploads will fail at runtime instead.
    pub fn warnings(&self) -> Vec<String> {
        let required = [
            ("S3_ENDPOINT", &self.endpoint),
            ("S3_REGION", &self.region),
            ("S3_BUCKET", &self.bucket),
            ("S3_ACCESS_KEY", &self.access_key),
            ("S3_SECRET_KEY", &self.secret_key),
        ];

        let mut warnings: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| format!("{} is not set", name))
            .collect();

        if let Some(Err(e)) = self.bucket.as_deref().map(validate_bucket_name) {
            warnings.push(e.to_string());
        }

        warnings
    }

    /// Build the public URL for an object key
    ///
    /// Prefers the configured public URL base, then `<endpoint>/<bucket>`,
    /// then the regional AWS path-style host.
    pub fn public_url(&self, key: &str) -> String {
        if let Some(base) = &self.public_url_base {
            return format!("{}/{}", base.trim_end_matches('/'), key);
        }

        if let Some(endpoint) = &self.endpoint {
            return format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket(),
                key
            );
        }

        format!(
            "https://s3.{}.amazonaws.com/{}/{}",
            self.region(),
            self.bucket(),
            key
        )
    }
}

/// Validate S3 bucket name according to AWS rules
fn validate_bucket_name(bucket: &str) -> Result<()> {
    if bucket.len() < 3 || bucket.len() > 63 {
        anyhow::bail!(
            "S3_BUCKET '{}' must be between 3 and 63 characters (got {})",
            bucket,
            bucket.len()
        );
    }

    let first = bucket.chars().next().unwrap_or_default();
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        anyhow::bail!(
            "S3_BUCKET '{}' must start with a lowercase letter or number",
            bucket
        );
    }

    let last = bucket.chars().last().unwrap_or_default();
    if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
        anyhow::bail!(
            "S3_BUCKET '{}' must end with a lowercase letter or number",
            bucket
        );
    }

    if let Some(c) = bucket
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' && *c != '.')
    {
        anyhow::bail!(
            "S3_BUCKET '{}' contains invalid character '{}'. Only lowercase letters, numbers, hyphens, and periods are allowed",
            bucket,
            c
        );
    }

    if bucket.contains("..") {
        anyhow::bail!("S3_BUCKET '{}' cannot contain consecutive periods", bucket);
    }

    if bucket.split('.').all(|part| part.parse::<u8>().is_ok()) {
        anyhow::bail!(
            "S3_BUCKET '{}' cannot be formatted as an IP address",
            bucket
        );
    }

    Ok(())
}
