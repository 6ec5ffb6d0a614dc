//! Audit trail for access decisions
//!
//! The engine hands every decision to an [`AuditSink`]. Sink failures are
//! logged and never change the decision.

use super::decision::{AccessRequest, Decision};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Audit record for one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecisionEvent {
    /// Decision ID
    pub id: String,

    pub principal_id: String,

    pub resource_type: String,

    pub resource_id: String,

    pub action: String,

    pub allowed: bool,

    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_via: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_id: Option<String>,

    pub organization_id: Option<String>,

    pub cache_hit: bool,

    pub latency_us: u64,

    pub timestamp: DateTime<Utc>,
}

impl AccessDecisionEvent {
    pub fn new(request: &AccessRequest, organization_id: Option<&str>, decision: &Decision) -> Self {
        Self {
            id: decision.id.clone(),
            principal_id: request.principal_id.clone(),
            resource_type: request.resource_type.clone(),
            resource_id: request.resource_id.clone(),
            action: request.action.clone(),
            allowed: decision.allowed,
            reason: decision.reason.clone(),
            matched_via: decision.matched_via.clone(),
            binding_id: decision.binding_id.clone(),
            organization_id: organization_id.map(str::to_string),
            cache_hit: decision.cache_hit,
            latency_us: decision.evaluation_duration.as_micros() as u64,
            timestamp: decision.evaluated_at,
        }
    }
}

/// Destination for decision audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_access_decision(&self, event: &AccessDecisionEvent) -> Result<()>;
}

/// Bounded in-memory audit log
///
/// Keeps the most recent `capacity` events; older ones are dropped.
pub struct InMemoryAuditLog {
    buffer: Arc<RwLock<VecDeque<AccessDecisionEvent>>>,
    capacity: usize,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Most recent events for a principal, newest first
    pub async fn query_by_principal(&self, principal_id: &str, limit: usize) -> Vec<AccessDecisionEvent> {
        self.buffer
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.principal_id == principal_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.buffer.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buffer.read().await.is_empty()
    }

    pub async fn stats(&self) -> AuditStats {
        let buffer = self.buffer.read().await;
        let total = buffer.len();
        let allowed = buffer.iter().filter(|e| e.allowed).count();
        let avg_latency_us = if total > 0 {
            buffer.iter().map(|e| e.latency_us).sum::<u64>() as f64 / total as f64
        } else {
            0.0
        };

        AuditStats {
            total_decisions: total,
            allowed_decisions: allowed,
            denied_decisions: total - allowed,
            cache_hits: buffer.iter().filter(|e| e.cache_hit).count(),
            avg_latency_us,
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn log_access_decision(&self, event: &AccessDecisionEvent) -> Result<()> {
        let mut buffer = self.buffer.write().await;
        buffer.push_back(event.clone());
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
        Ok(())
    }
}

/// Emits each decision as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_access_decision(&self, event: &AccessDecisionEvent) -> Result<()> {
        info!(
            target: "bastion_authz::audit",
            decision_id = %event.id,
            principal = %event.principal_id,
            resource = %format!("{}:{}", event.resource_type, event.resource_id),
            action = %event.action,
            allowed = event.allowed,
            cache_hit = event.cache_hit,
            latency_us = event.latency_us,
            "{}",
            event.reason
        );
        Ok(())
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditStats {
    pub total_decisions: usize,
    pub allowed_decisions: usize,
    pub denied_decisions: usize,
    pub cache_hits: usize,
    pub avg_latency_us: f64,
}
