//! Typed evaluation cache over a [`CacheService`]
//!
//! Key layout:
//!
//! ```text
//! roles:<principal>:<org|->:<group|->                             role sets, 5 min
//! decision:<principal>:<org|->:<group|->:<type>:<id>:<action>     decisions, 1 min
//! role:<role_id>:dep:<dependent key>                              dependency markers
//! ```
//!
//! Every role named in a cached value gets a marker pointing back at the
//! value's key, written before the value and with the same TTL. Invalidating
//! a role walks its markers and drops each dependent. A value read back
//! while any of its markers is gone (evicted, or lost to a failed write) is
//! dropped and reported as a miss, since a role change could no longer
//! reach it.
//!
//! Role sets and decisions both carry a `valid_until` derived from the time
//! windows they were computed from. Entries never outlive it.

use super::CacheService;
use crate::engine::Decision;
use crate::hierarchy::EffectiveRoleSet;
use crate::types::EvalContext;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ROLE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(60);

const NONE_SEGMENT: &str = "-";

pub struct EvaluationCache {
    backend: Arc<dyn CacheService>,
    role_ttl: Duration,
    decision_ttl: Duration,
}

impl EvaluationCache {
    pub fn new(backend: Arc<dyn CacheService>, role_ttl: Duration, decision_ttl: Duration) -> Self {
        Self {
            backend,
            role_ttl,
            decision_ttl,
        }
    }

    pub fn with_defaults(backend: Arc<dyn CacheService>) -> Self {
        Self::new(backend, DEFAULT_ROLE_TTL, DEFAULT_DECISION_TTL)
    }

    pub fn role_ttl(&self) -> Duration {
        self.role_ttl
    }

    pub fn decision_ttl(&self) -> Duration {
        self.decision_ttl
    }

    pub fn roles_key(principal_id: &str, ctx: &EvalContext) -> String {
        format!(
            "roles:{}:{}:{}",
            principal_id,
            ctx.organization_id.as_deref().unwrap_or(NONE_SEGMENT),
            ctx.group_id.as_deref().unwrap_or(NONE_SEGMENT)
        )
    }

    pub fn decision_key(
        principal_id: &str,
        ctx: &EvalContext,
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> String {
        format!(
            "decision:{}:{}:{}:{}:{}:{}",
            principal_id,
            ctx.organization_id.as_deref().unwrap_or(NONE_SEGMENT),
            ctx.group_id.as_deref().unwrap_or(NONE_SEGMENT),
            resource_type,
            resource_id,
            action
        )
    }

    fn marker_key(role_id: &str, dependent: &str) -> String {
        format!("role:{}:dep:{}", role_id, dependent)
    }

    /// Cached role set still valid at `ctx.now`; backend or decoding
    /// failures read as a miss
    pub async fn get_roles(&self, principal_id: &str, ctx: &EvalContext) -> Option<EffectiveRoleSet> {
        let key = Self::roles_key(principal_id, ctx);
        let raw = self.read(&key).await?;
        let set: EffectiveRoleSet = match serde_json::from_str(&raw) {
            Ok(set) => set,
            Err(e) => {
                warn!("Discarding undecodable role cache entry {}: {}", key, e);
                self.remove(&key).await;
                return None;
            }
        };
        if set.valid_until.map_or(false, |until| ctx.now >= until) {
            debug!("Cached role set {} is past a membership or assignment window", key);
            return None;
        }
        let role_ids: BTreeSet<&str> = set.all_roles().map(|er| er.role.id.as_str()).collect();
        if !self.markers_intact(&key, &role_ids).await {
            return None;
        }
        Some(set)
    }

    /// Store a role set; the TTL is shortened to `valid_until` when that
    /// comes first
    pub async fn put_roles(&self, principal_id: &str, ctx: &EvalContext, set: &EffectiveRoleSet) {
        let key = Self::roles_key(principal_id, ctx);
        let Some(ttl) = Self::bounded_ttl(self.role_ttl, set.valid_until, ctx.now) else {
            return;
        };
        let role_ids: BTreeSet<&str> = set.all_roles().map(|er| er.role.id.as_str()).collect();
        self.write(&key, set, ttl, role_ids).await;
    }

    /// Cached decision still valid at `now`
    ///
    /// A decision whose `valid_until` has been reached is treated as a miss
    /// even if the entry itself has not expired.
    pub async fn get_decision(&self, key: &str, now: DateTime<Utc>) -> Option<Decision> {
        let raw = self.read(key).await?;
        let decision: Decision = match serde_json::from_str(&raw) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Discarding undecodable decision cache entry {}: {}", key, e);
                self.remove(key).await;
                return None;
            }
        };
        if decision.valid_until.map_or(false, |until| now >= until) {
            debug!("Cached decision {} is past its validity window", key);
            return None;
        }
        let role_ids: BTreeSet<&str> = decision.role_ids().collect();
        if !self.markers_intact(key, &role_ids).await {
            return None;
        }
        Some(decision)
    }

    /// Store a decision; the TTL is shortened to `valid_until` when that
    /// comes first, and the write is skipped when it has already passed
    pub async fn put_decision(&self, key: &str, decision: &Decision) {
        let Some(ttl) =
            Self::bounded_ttl(self.decision_ttl, decision.valid_until, decision.evaluated_at)
        else {
            return;
        };
        let role_ids: BTreeSet<&str> = decision.role_ids().collect();
        self.write(key, decision, ttl, role_ids).await;
    }

    /// Drop every cached value that named `role_id`; returns the number of
    /// dependents removed
    pub async fn invalidate_role(&self, role_id: &str) -> usize {
        let prefix = format!("role:{}:dep:", role_id);
        let markers = self.list(&format!("{}*", prefix)).await;
        let mut removed = 0;
        for marker in markers {
            if let Some(dependent) = marker.strip_prefix(&prefix) {
                self.remove(dependent).await;
                removed += 1;
            }
            self.remove(&marker).await;
        }
        debug!("Invalidated {} cache entries depending on role {}", removed, role_id);
        removed
    }

    /// Drop every role set and decision cached for `principal_id`
    pub async fn invalidate_principal(&self, principal_id: &str) -> usize {
        self.remove_matching(&format!("decision:{}:*", principal_id)).await
            + self.remove_matching(&format!("roles:{}:*", principal_id)).await
    }

    /// Drop every role set and decision computed with `group_id` as context group
    pub async fn invalidate_group_context(&self, group_id: &str) -> usize {
        self.remove_matching(&format!("roles:*:*:{}", group_id)).await
            + self.remove_matching(&format!("decision:*:*:{}:*", group_id)).await
    }

    /// Drop every role set and decision
    pub async fn invalidate_all(&self) -> usize {
        self.remove_matching("roles:*").await + self.remove_matching("decision:*").await
    }

    async fn write<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        role_ids: BTreeSet<&str>,
    ) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };
        for role_id in role_ids {
            let marker = Self::marker_key(role_id, key);
            if let Err(e) = self.backend.set(&marker, String::new(), ttl).await {
                warn!("Cache write failed for {}, not caching {}: {}", marker, key, e);
                return;
            }
        }
        if let Err(e) = self.backend.set(key, encoded, ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// `ttl`, cut short at `valid_until`; `None` once that has passed
    fn bounded_ttl(
        ttl: Duration,
        valid_until: Option<DateTime<Utc>>,
        from: DateTime<Utc>,
    ) -> Option<Duration> {
        match valid_until {
            Some(until) => match (until - from).to_std() {
                Ok(remaining) if !remaining.is_zero() => Some(remaining.min(ttl)),
                _ => None,
            },
            None => Some(ttl),
        }
    }

    /// Every marker for `key` is still present. Otherwise the dependent is
    /// dropped so it cannot outlive an invalidation it would no longer see.
    async fn markers_intact(&self, key: &str, role_ids: &BTreeSet<&str>) -> bool {
        for role_id in role_ids {
            let marker = Self::marker_key(role_id, key);
            match self.backend.get(&marker).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("Dependency marker {} is gone, dropping {}", marker, key);
                    self.remove(key).await;
                    return false;
                }
                Err(e) => {
                    warn!("Cache read failed for {}, treating {} as a miss: {}", marker, key, e);
                    return false;
                }
            }
        }
        true
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    async fn list(&self, pattern: &str) -> Vec<String> {
        self.backend.keys(pattern).await.unwrap_or_else(|e| {
            warn!("Cache key listing failed for {}: {}", pattern, e);
            Vec::new()
        })
    }

    async fn remove_matching(&self, pattern: &str) -> usize {
        let keys = self.list(pattern).await;
        for key in &keys {
            self.remove(key).await;
        }
        keys.len()
    }
}
