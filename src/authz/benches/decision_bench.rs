//! Decision engine benchmarks
//!
//! Cold path: cache disabled, every evaluation resolves the hierarchy and
//! queries both grant models. Hot path: repeated requests served from the
//! decision cache.

use bastion_authz::model::{ResourcePermission, Role, UserRole};
use bastion_authz::store::{PermissionStore, RoleStore};
use bastion_authz::{DecisionEngine, EngineConfig, EvalContext, InMemoryStore, ResourceCheck};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// A chain of `depth` roles with the only grant on the topmost one
async fn chain_store(depth: usize, grants_per_role: usize) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for i in 0..depth {
        let mut role = Role::global(format!("role-{}", i)).with_id(format!("role-{}", i));
        if i + 1 < depth {
            role.parent_id = Some(format!("role-{}", i + 1));
        }
        store.insert_role(role).await.unwrap();

        for g in 0..grants_per_role {
            store
                .insert_resource_permission(ResourcePermission::new(
                    format!("role-{}", i),
                    "document",
                    format!("doc-{}", g),
                    "edit",
                ))
                .await
                .unwrap();
        }
    }
    store
        .insert_resource_permission(ResourcePermission::type_level(
            format!("role-{}", depth - 1),
            "document",
            "read",
        ))
        .await
        .unwrap();
    store
        .insert_user_role(UserRole::new("alice", "role-0"))
        .await
        .unwrap();
    store
}

fn engine(store: Arc<InMemoryStore>, cached: bool) -> DecisionEngine {
    let mut config = EngineConfig::default();
    config.cache.enabled = cached;
    config.audit.enabled = false;
    DecisionEngine::new(config, store).unwrap()
}

fn bench_cold_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("evaluate_uncached");

    for depth in [1usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let engine = rt.block_on(async { engine(chain_store(depth, 10).await, false) });
            let ctx = EvalContext::new();

            b.to_async(&rt).iter(|| async {
                let decision = engine
                    .evaluate(
                        black_box("alice"),
                        black_box("document"),
                        black_box("sensitive-123"),
                        black_box("read"),
                        &ctx,
                    )
                    .await
                    .unwrap();
                black_box(decision);
            });
        });
    }

    group.finish();
}

fn bench_hot_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(async {
        let engine = engine(chain_store(8, 10).await, true);
        // Warm the cache
        engine
            .evaluate("alice", "document", "sensitive-123", "read", &EvalContext::new())
            .await
            .unwrap();
        engine
    });
    let ctx = EvalContext::new();

    c.bench_function("evaluate_cached", |b| {
        b.to_async(&rt).iter(|| async {
            let decision = engine
                .evaluate("alice", "document", black_box("sensitive-123"), "read", &ctx)
                .await
                .unwrap();
            black_box(decision);
        });
    });
}

fn bench_bulk(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(async { engine(chain_store(4, 10).await, true) });
    let ctx = EvalContext::new();
    let checks: Vec<ResourceCheck> = (0..20)
        .map(|i| ResourceCheck::new("document", format!("doc-{}", i), "edit"))
        .collect();

    c.bench_function("evaluate_bulk_20", |b| {
        b.to_async(&rt).iter(|| async {
            let bulk = engine
                .evaluate_bulk("alice", black_box(&checks), &ctx)
                .await
                .unwrap();
            black_box(bulk);
        });
    });
}

fn bench_role_resolution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(async { engine(chain_store(8, 0).await, false) });
    let ctx = EvalContext::new();

    c.bench_function("resolve_effective_roles_depth_8", |b| {
        b.to_async(&rt).iter(|| async {
            let roles = engine
                .resolver()
                .resolve_effective_roles(black_box("alice"), &ctx)
                .await
                .unwrap();
            black_box(roles);
        });
    });
}

criterion_group!(
    benches,
    bench_cold_path,
    bench_hot_path,
    bench_bulk,
    bench_role_resolution
);
criterion_main!(benches);
