//! Decision engine
//!
//! Orchestrates hierarchy resolution, permission matching and caveat
//! evaluation, with caching, audit and metrics around the pipeline.

pub mod audit;
pub mod decision;
pub mod invalidation;
pub mod metrics;

pub use audit::{AccessDecisionEvent, AuditSink, AuditStats, InMemoryAuditLog, TracingAuditSink};
pub use decision::{AccessRequest, BulkDecision, Decision, ResourceCheck, RoleSummary};
pub use invalidation::InvalidationEvent;
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::cache::{CacheService, CacheStats, EvaluationCache, InMemoryCache};
use crate::caveat::CaveatEvaluator;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::hierarchy::{ConditionalGrant, EffectiveRoleSet, HierarchyResolver};
use crate::matcher::{
    DirectResourceGrantMatcher, GrantMatch, GrantMatcher, GrantRequest, NamedPermissionMatcher,
};
use crate::model::{BindingTarget, Role};
use crate::store::AccessStore;
use crate::types::{earliest, EvalContext};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Main decision engine
///
/// # Pipeline
///
/// ```text
/// request → validate → [decision cache] → HierarchyResolver → matchers → caveats → Decision
///                                              ↓                                      ↓
///                                         [role cache]                     [cache, audit, metrics]
/// ```
pub struct DecisionEngine {
    store: Arc<dyn AccessStore>,

    resolver: HierarchyResolver,

    /// Grant models, ORed in order
    matchers: Vec<Arc<dyn GrantMatcher>>,

    /// Checks permission bindings directly
    named: NamedPermissionMatcher,

    caveats: CaveatEvaluator,

    cache: Option<EvaluationCache>,

    /// Built-in backend, kept for statistics
    local_cache: Option<Arc<InMemoryCache>>,

    audit: Option<Arc<dyn AuditSink>>,

    metrics: Option<Arc<MetricsCollector>>,

    config: EngineConfig,
}

impl DecisionEngine {
    /// Create an engine over `store` with both grant models
    pub fn new(config: EngineConfig, store: Arc<dyn AccessStore>) -> Result<Self> {
        config.validate()?;

        let matchers: Vec<Arc<dyn GrantMatcher>> = vec![
            Arc::new(NamedPermissionMatcher::new(store.clone())),
            Arc::new(DirectResourceGrantMatcher::new(store.clone())),
        ];

        let (cache, local_cache) = if config.cache.enabled {
            let backend = Arc::new(InMemoryCache::new(config.cache.capacity));
            let cache = EvaluationCache::new(
                backend.clone(),
                config.cache.role_ttl(),
                config.cache.decision_ttl(),
            );
            (Some(cache), Some(backend))
        } else {
            (None, None)
        };

        let audit: Option<Arc<dyn AuditSink>> = if config.audit.enabled {
            Some(Arc::new(InMemoryAuditLog::new(config.audit.buffer_size)))
        } else {
            None
        };

        let metrics = config
            .metrics
            .enabled
            .then(|| Arc::new(MetricsCollector::new()));

        info!(
            "DecisionEngine initialized with cache={}, audit={}, metrics={}, max_depth={}",
            config.cache.enabled, config.audit.enabled, config.metrics.enabled, config.hierarchy.max_depth
        );

        Ok(Self {
            resolver: HierarchyResolver::with_max_depth(store.clone(), config.hierarchy.max_depth),
            named: NamedPermissionMatcher::new(store.clone()),
            caveats: CaveatEvaluator::new(store.clone()),
            store,
            matchers,
            cache,
            local_cache,
            audit,
            metrics,
            config,
        })
    }

    /// Replace the grant models
    pub fn with_matchers(mut self, matchers: Vec<Arc<dyn GrantMatcher>>) -> Self {
        self.matchers = matchers;
        self
    }

    /// Use a different cache backend, keeping the configured TTLs
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheService>) -> Self {
        self.cache = Some(EvaluationCache::new(
            backend,
            self.config.cache.role_ttl(),
            self.config.cache.decision_ttl(),
        ));
        self.local_cache = None;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &HierarchyResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<dyn AccessStore> {
        &self.store
    }

    /// Decide whether `principal_id` may perform `action` on the resource
    ///
    /// # Pipeline
    ///
    /// 1. Validate the request; a missing field is an uncached DENY
    /// 2. Check the decision cache
    /// 3. Resolve effective roles (through the role cache)
    /// 4. Run every matcher over the unconditional roles
    /// 5. Try binding-mediated grants whose caveat passes
    /// 6. Otherwise DENY
    /// 7. Cache, audit and record metrics
    ///
    /// Store failures are returned as errors, never as a DENY.
    #[instrument(skip(self, ctx), fields(org = ?ctx.organization_id, group = ?ctx.group_id))]
    pub async fn evaluate(
        &self,
        principal_id: &str,
        resource_type: &str,
        resource_id: &str,
        action: &str,
        ctx: &EvalContext,
    ) -> Result<Decision> {
        let start = Instant::now();
        let request = AccessRequest::new(principal_id, resource_type, resource_id, action);

        if let Some(field) = request.missing_field() {
            debug!("Rejecting request: {} is empty", field);
            if let Some(metrics) = &self.metrics {
                metrics.record_validation_denial().await;
            }
            let decision = Decision::deny(format!("validation failed: {} is required", field), ctx)
                .with_trace(vec![format!("validation: {} is required", field)]);
            return Ok(self.finalize(&request, ctx, decision, start, None).await);
        }

        let key = EvaluationCache::decision_key(principal_id, ctx, resource_type, resource_id, action);

        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get_decision(&key, ctx.now).await {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit().await;
                }
                debug!("Decision cache hit for {}", key);
                cached.cache_hit = true;
                return Ok(self.finalize(&request, ctx, cached, start, None).await);
            }

            if let Some(metrics) = &self.metrics {
                metrics.record_cache_miss().await;
            }
        }

        match self.decide(&request, ctx).await {
            Ok(decision) => Ok(self.finalize(&request, ctx, decision, start, Some(&key)).await),
            Err(e) => {
                warn!(
                    "Evaluation of {}:{}:{} for {} failed: {}",
                    resource_type, resource_id, action, principal_id, e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_error().await;
                }
                Err(e)
            }
        }
    }

    /// Evaluate many checks for one principal
    ///
    /// A check that fails with an infrastructure error is reported as a DENY
    /// with reason `evaluation error` instead of failing the batch.
    pub async fn evaluate_bulk(
        &self,
        principal_id: &str,
        checks: &[ResourceCheck],
        ctx: &EvalContext,
    ) -> Result<BulkDecision> {
        let mut bulk = BulkDecision {
            principal_id: principal_id.to_string(),
            ..Default::default()
        };

        for check in checks {
            let decision = match self
                .evaluate(principal_id, &check.resource_type, &check.resource_id, &check.action, ctx)
                .await
            {
                Ok(decision) => decision,
                Err(e) => {
                    warn!("Bulk check {} failed: {}", check.key(), e);
                    Decision::deny("evaluation error", ctx)
                }
            };
            bulk.results.insert(check.key(), decision);
        }

        debug!(
            "Bulk evaluation for {}: {}/{} allowed",
            principal_id,
            bulk.allowed_count(),
            checks.len()
        );
        Ok(bulk)
    }

    /// The subset of `candidate_actions` that evaluate to ALLOW
    pub async fn expand_actions<S: AsRef<str>>(
        &self,
        principal_id: &str,
        resource_type: &str,
        resource_id: &str,
        candidate_actions: &[S],
        ctx: &EvalContext,
    ) -> Result<Vec<String>> {
        let mut allowed = Vec::new();
        for action in candidate_actions {
            let action = action.as_ref();
            if self
                .evaluate(principal_id, resource_type, resource_id, action, ctx)
                .await?
                .allowed
            {
                allowed.push(action.to_string());
            }
        }
        Ok(allowed)
    }

    /// Does the principal unconditionally hold a role named `role_name`?
    ///
    /// Roles held only through caveated bindings do not count.
    pub async fn has_role(&self, principal_id: &str, role_name: &str, ctx: &EvalContext) -> Result<bool> {
        let roles = self.effective_roles(principal_id, ctx).await?;
        Ok(roles.roles.iter().any(|er| er.role.name == role_name))
    }

    /// Effective role set, served from the role cache when possible
    pub async fn effective_roles(&self, principal_id: &str, ctx: &EvalContext) -> Result<EffectiveRoleSet> {
        if let Some(cache) = &self.cache {
            if let Some(roles) = cache.get_roles(principal_id, ctx).await {
                debug!("Role cache hit for {}", principal_id);
                return Ok(roles);
            }
        }

        let roles = self.resolver.resolve_effective_roles(principal_id, ctx).await?;

        if let Some(cache) = &self.cache {
            cache.put_roles(principal_id, ctx, &roles).await;
        }
        Ok(roles)
    }

    pub async fn metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.snapshot().await),
            None => None,
        }
    }

    /// Statistics of the built-in cache backend
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.local_cache.as_ref().map(|cache| cache.stats())
    }

    async fn decide(&self, request: &AccessRequest, ctx: &EvalContext) -> Result<Decision> {
        let mut trace = Vec::new();
        let roles = self.effective_roles(&request.principal_id, ctx).await?;
        trace.push(format!(
            "resolved {} roles, {} conditional grants{}",
            roles.roles.len(),
            roles.conditional.len(),
            if roles.truncated { " (truncated)" } else { "" }
        ));

        if roles.is_empty() {
            debug!("No roles for {}", request.principal_id);
            return Ok(Decision::deny("no roles assigned", ctx)
                .with_trace(trace)
                .valid_until(roles.valid_until));
        }

        let grant_request = GrantRequest::new(&request.resource_type, &request.resource_id, &request.action);

        let unconditional: Vec<Role> = roles.roles.iter().map(|er| er.role.clone()).collect();
        if let Some(grant) = self.match_roles(&unconditional, &grant_request, &mut trace).await? {
            return Ok(Decision::allow(&grant, ctx)
                .with_roles(&roles)
                .with_trace(trace)
                .valid_until(roles.valid_until));
        }

        let mut caveat_failures = Vec::new();
        let mut not_before: Option<DateTime<Utc>> = None;

        for conditional in &roles.conditional {
            let binding = &conditional.binding;
            if !binding.applies_to(&request.resource_type, &request.resource_id) {
                trace.push(format!("binding {}: resource out of scope", binding.id));
                continue;
            }

            let outcome = self.caveats.evaluate(binding, &request.principal_id, ctx).await?;
            if !outcome.passed {
                trace.push(format!("binding {}: {}", binding.id, outcome.reason));
                let starts_at = binding
                    .caveat
                    .as_ref()
                    .and_then(|caveat| caveat.window)
                    .and_then(|window| window.starts_at)
                    .filter(|start| *start > ctx.now);
                not_before = earliest(not_before, starts_at);
                caveat_failures.push(outcome.reason);
                continue;
            }

            if let Some(decision) = self
                .match_binding(conditional, &grant_request, ctx, &mut trace)
                .await?
            {
                let ends_at = binding.caveat.as_ref().and_then(|caveat| caveat.ends_at());
                let until = earliest(earliest(ends_at, outcome.valid_until), roles.valid_until);
                return Ok(decision
                    .through_binding(&binding.id, outcome.column_groups)
                    .valid_until(until)
                    .with_roles(&roles)
                    .with_trace(trace));
            }
        }

        let mut reason = format!(
            "no matching permission for {} on {}:{}",
            request.action, request.resource_type, request.resource_id
        );
        if !caveat_failures.is_empty() {
            reason.push_str(&format!(" ({})", caveat_failures.join("; ")));
        }
        Ok(Decision::deny(reason, ctx)
            .with_roles(&roles)
            .with_trace(trace)
            .valid_until(earliest(not_before, roles.valid_until)))
    }

    async fn match_roles(
        &self,
        roles: &[Role],
        request: &GrantRequest<'_>,
        trace: &mut Vec<String>,
    ) -> Result<Option<GrantMatch>> {
        if roles.is_empty() {
            return Ok(None);
        }
        for matcher in &self.matchers {
            if let Some(grant) = matcher.matches(roles, request).await? {
                trace.push(format!("{}: matched role {}", matcher.name(), grant.role_name));
                return Ok(Some(grant));
            }
            trace.push(format!("{}: no match", matcher.name()));
        }
        Ok(None)
    }

    async fn match_binding(
        &self,
        conditional: &ConditionalGrant,
        request: &GrantRequest<'_>,
        ctx: &EvalContext,
        trace: &mut Vec<String>,
    ) -> Result<Option<Decision>> {
        match &conditional.binding.target {
            BindingTarget::Role(_) => {
                let bound: Vec<Role> = conditional.roles.iter().map(|er| er.role.clone()).collect();
                Ok(self
                    .match_roles(&bound, request, trace)
                    .await?
                    .map(|grant| Decision::allow(&grant, ctx)))
            }
            BindingTarget::Permission(permission_id) => {
                if self.named.permission_id_covers(permission_id, request).await? {
                    trace.push(format!(
                        "binding {}: bound permission {} matched",
                        conditional.binding.id, permission_id
                    ));
                    Ok(Some(Decision::allow_bound_permission(
                        &conditional.binding.id,
                        permission_id,
                        ctx,
                    )))
                } else {
                    trace.push(format!(
                        "binding {}: bound permission {} does not cover the request",
                        conditional.binding.id, permission_id
                    ));
                    Ok(None)
                }
            }
        }
    }

    async fn finalize(
        &self,
        request: &AccessRequest,
        ctx: &EvalContext,
        mut decision: Decision,
        start: Instant,
        cache_key: Option<&str>,
    ) -> Decision {
        decision.evaluation_duration = start.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_latency(decision.evaluation_duration).await;
            metrics
                .record_decision(decision.allowed, decision.binding_id.is_some())
                .await;
        }

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.put_decision(key, &decision).await;
        }

        if let Some(audit) = &self.audit {
            let event = AccessDecisionEvent::new(request, ctx.organization_id.as_deref(), &decision);
            if let Err(e) = audit.log_access_decision(&event).await {
                warn!("Audit sink rejected decision {}: {}", decision.id, e);
            }
        }

        info!(
            "Decision: {} for {} on {}:{}:{} ({})",
            if decision.allowed { "ALLOW" } else { "DENY" },
            request.principal_id,
            request.resource_type,
            request.resource_id,
            request.action,
            decision.reason
        );

        decision
    }
}
