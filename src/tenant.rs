//! Tenant context
//!
//! A tenant context names the tenant of the current unit of work, the
//! schema isolating its tables and the database alias it targets. The
//! task-local provider sets it on request entry and drops it on exit.

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Default database alias
pub const DEFAULT_ALIAS: &str = "default";

fn default_alias() -> String {
    DEFAULT_ALIAS.to_string()
}

/// Tenant scope of one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Tenant identifier
    pub tenant_id: String,

    /// Schema holding the tenant's tables; `None` uses the default schema
    #[serde(default)]
    pub schema: Option<String>,

    /// Database alias the tenant's data lives in
    #[serde(default = "default_alias")]
    pub alias: String,
}

impl TenantContext {
    /// Create a context for `tenant_id` on `alias` using the default schema
    pub fn new(tenant_id: impl Into<String>, alias: impl Into<String>) -> Self {
        TenantContext {
            tenant_id: tenant_id.into(),
            schema: None,
            alias: alias.into(),
        }
    }

    /// Bind the context to a tenant schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Supplies the tenant context of the calling unit of work
pub trait TenantContextProvider: Send + Sync {
    /// Current tenant context, if the caller is tenant-scoped
    fn current(&self) -> Option<TenantContext>;
}

tokio::task_local! {
    static CURRENT_TENANT: TenantContext;
}

/// Provider reading a tokio task-local set by [`TaskLocalTenantProvider::scope`]
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskLocalTenantProvider;

impl TaskLocalTenantProvider {
    /// Run `fut` with `context` as the current tenant
    pub async fn scope<F: Future>(context: TenantContext, fut: F) -> F::Output {
        CURRENT_TENANT.scope(context, fut).await
    }
}

impl TenantContextProvider for TaskLocalTenantProvider {
    fn current(&self) -> Option<TenantContext> {
        CURRENT_TENANT.try_with(Clone::clone).ok()
    }
}

/// Provider that never yields a tenant
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTenant;

impl TenantContextProvider for NoTenant {
    fn current(&self) -> Option<TenantContext> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_context_builder() {
        let ctx = TenantContext::new("acme", "main").with_schema("acme");
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.alias, "main");
        assert_eq!(ctx.schema.as_deref(), Some("acme"));
    }

    #[test]
    fn test_tenant_context_deserialize_defaults() {
        let ctx: TenantContext = toml::from_str("tenant_id = \"acme\"").unwrap();
        assert_eq!(ctx.alias, DEFAULT_ALIAS);
        assert!(ctx.schema.is_none());
    }

    #[tokio::test]
    async fn test_task_local_provider_scope() {
        let provider = TaskLocalTenantProvider;
        assert!(provider.current().is_none());

        let ctx = TenantContext::new("acme", "main").with_schema("acme");
        let seen = TaskLocalTenantProvider::scope(ctx.clone(), async { provider.current() }).await;
        assert_eq!(seen, Some(ctx));

        assert!(provider.current().is_none());
    }

    #[tokio::test]
    async fn test_task_local_provider_isolated_between_tasks() {
        let a = tokio::spawn(TaskLocalTenantProvider::scope(
            TenantContext::new("a", "db"),
            async { TaskLocalTenantProvider.current().map(|c| c.tenant_id) },
        ));
        let b = tokio::spawn(async { TaskLocalTenantProvider.current() });

        assert_eq!(a.await.unwrap().as_deref(), Some("a"));
        assert!(b.await.unwrap().is_none());
    }

    #[test]
    fn test_no_tenant_provider() {
        assert!(NoTenant.current().is_none());
    }
}
