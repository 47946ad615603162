//! Tenant identity and resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque tenant identifier. Every cache key is scoped by one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        TenantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId(s)
    }
}

/// Yields the tenant of the current request.
///
/// Synchronous: implementations read it from request-scoped state
/// that is already resolved (auth claims, a header), never from the network.
pub trait TenantResolver: Send + Sync {
    fn tenant_id(&self) -> TenantId;
}

/// Resolver that always returns the same tenant. Useful for jobs and tests.
#[derive(Clone, Debug)]
pub struct FixedTenant(pub TenantId);

impl FixedTenant {
    pub fn new(id: impl Into<TenantId>) -> Self {
        FixedTenant(id.into())
    }
}

impl TenantResolver for FixedTenant {
    fn tenant_id(&self) -> TenantId {
        self.0.clone()
    }
}

impl<F> TenantResolver for F
where
    F: Fn() -> TenantId + Send + Sync,
{
    fn tenant_id(&self) -> TenantId {
        self()
    }
}
