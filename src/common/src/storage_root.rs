use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Schemes a pipeline root may use. Anything else is rejected at parse time.
pub const SUPPORTED_SCHEMES: [&str; 3] = ["gs://", "s3://", "file:///"];

// the prefix travels as a query value and must decode back unchanged
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

static ROOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z0-9]+:///?)([^/]+)(/[^ ?]*)?$").expect("valid storage root pattern")
});

#[derive(Debug)]
pub enum StorageRootError {
    /// The root string does not look like `scheme://bucket[/path]`
    Unrecognized(String),

    /// The root is well formed but its scheme has no backend
    UnsupportedScheme(String),

    /// A URI that lives outside of the configured bucket and prefix
    ForeignUri { uri: String, expected: String },

    /// A URI that names the root itself instead of an object under it
    EmptyKey { uri: String, expected: String },

    /// A bucket URL handed to an object store could not be parsed
    InvalidBucketUrl { url: String, reason: String },
}

impl fmt::Display for StorageRootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageRootError::Unrecognized(root) => {
                write!(f, "Unrecognized pipeline root format: {:?}", root)
            }
            StorageRootError::UnsupportedScheme(root) => {
                write!(f, "Unsupported Cloud bucket: {:?}", root)
            }
            StorageRootError::ForeignUri { uri, expected } => write!(
                f,
                "URI {:?} does not have expected bucket prefix {:?}",
                uri, expected
            ),
            StorageRootError::EmptyKey { uri, expected } => write!(
                f,
                "URI {:?} has empty key given prefixed bucket {:?}",
                uri, expected
            ),
            StorageRootError::InvalidBucketUrl { url, reason } => {
                write!(f, "Invalid bucket URL {:?}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for StorageRootError {}

/// The configured base location under which all artifact bytes of a run are addressed.
///
/// `prefix` is either empty or ends with `/`, so `scheme + bucket + "/" + prefix + key`
/// always yields a well-formed object URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRoot {
    scheme: String,
    bucket_name: String,
    prefix: String,
}

impl StorageRoot {
    pub fn parse(root: &str) -> Result<Self, StorageRootError> {
        let captures = ROOT_PATTERN
            .captures(root)
            .ok_or_else(|| StorageRootError::Unrecognized(root.to_string()))?;

        let scheme = &captures[1];
        if !SUPPORTED_SCHEMES.contains(&scheme) {
            return Err(StorageRootError::UnsupportedScheme(root.to_string()));
        }

        let path = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
        let mut prefix = path.trim_matches('/').to_string();
        if !prefix.is_empty() {
            prefix.push('/');
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket_name: captures[2].to_string(),
            prefix,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Root URL handed to the object store; the prefix travels as a query parameter so the
    /// store scopes every key under it.
    pub fn to_base_url(&self) -> String {
        let url = format!("{}{}", self.scheme, self.bucket_name);
        if self.prefix.is_empty() {
            url
        } else {
            format!(
                "{}?prefix={}",
                url,
                utf8_percent_encode(&self.prefix, QUERY_VALUE)
            )
        }
    }

    fn prefixed_bucket(&self) -> String {
        format!("{}{}/{}", self.scheme, self.bucket_name, self.prefix)
    }

    pub fn key_for(&self, uri: &str) -> Result<String, StorageRootError> {
        let expected = self.prefixed_bucket();
        let remainder = uri
            .strip_prefix(&expected)
            .ok_or_else(|| StorageRootError::ForeignUri {
                uri: uri.to_string(),
                expected: expected.clone(),
            })?;

        let key = remainder.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageRootError::EmptyKey {
                uri: uri.to_string(),
                expected,
            });
        }
        Ok(key.to_string())
    }

    pub fn uri_for(&self, key: &str) -> String {
        format!("{}{}", self.prefixed_bucket(), key.trim_start_matches('/'))
    }
}

impl fmt::Display for StorageRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefixed_bucket())
    }
}

/// A base URL as produced by [`StorageRoot::to_base_url`], decomposed for an object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketUrl {
    pub scheme: String,
    pub bucket: String,
    pub prefix: String,
}

impl BucketUrl {
    pub fn parse(root_url: &str) -> Result<Self, StorageRootError> {
        let invalid = |reason: String| StorageRootError::InvalidBucketUrl {
            url: root_url.to_string(),
            reason,
        };

        let url = Url::parse(root_url).map_err(|e| invalid(e.to_string()))?;

        // file:///bucket keeps the bucket in the path, every other scheme in the host
        let bucket = match url.scheme() {
            "file" => url.path().trim_matches('/').to_string(),
            _ => url.host_str().unwrap_or_default().to_string(),
        };
        if bucket.is_empty() {
            return Err(invalid("missing bucket name".to_string()));
        }

        let prefix = url
            .query_pairs()
            .find(|(name, _)| name == "prefix")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        Ok(Self {
            scheme: url.scheme().to_string(),
            bucket,
            prefix,
        })
    }

    /// Full object name inside the bucket for a key scoped under the prefix.
    pub fn object_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}
