//! Capability and network policy configuration
//!
//! Defines the runtime policy surface consumed by the effect system:
//! which capabilities a program may be granted and how the Net effect is
//! constrained. Policies load from TOML (`ailang.toml`) or are built
//! programmatically by the CLI from `--caps`.

use serde::{Deserialize, Serialize};

/// Default redirect ceiling for the Net effect
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Default response body cap for the Net effect (5 MB)
pub const DEFAULT_MAX_BODY_BYTES: u64 = 5 * 1024 * 1024;

/// Top-level runtime policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RuntimePolicy {
    /// Capabilities granted to the program (`IO`, `FS`, `Clock`, `Net`, `Env`)
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Network constraints
    #[serde(default)]
    pub network: NetworkPolicy,
}

/// Network constraints for the Net effect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NetworkPolicy {
    /// Domains requests may target; empty means any domain
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Permit plain-http URLs (default: HTTPS only)
    #[serde(default)]
    pub allow_insecure_http: bool,

    /// Permit requests that resolve to private or loopback addresses
    /// (default: blocked, as a DNS-rebinding defense)
    #[serde(default)]
    pub allow_private_ips: bool,

    /// Redirect ceiling
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Response body cap in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            allow_insecure_http: false,
            allow_private_ips: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl NetworkPolicy {
    /// Whether `domain` passes the allowlist. Subdomains of an allowed
    /// domain are allowed; an empty allowlist allows everything.
    pub fn domain_allowed(&self, domain: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let domain = domain.to_ascii_lowercase();
        self.allowed_domains.iter().any(|allowed| {
            let allowed = allowed.to_ascii_lowercase();
            domain == allowed || domain.ends_with(&format!(".{}", allowed))
        })
    }
}

impl RuntimePolicy {
    /// Parse a policy from TOML text
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// A policy granting the listed capabilities with default network
    /// constraints
    pub fn with_capabilities(caps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            capabilities: caps.into_iter().map(Into::into).collect(),
            network: NetworkPolicy::default(),
        }
    }
}
