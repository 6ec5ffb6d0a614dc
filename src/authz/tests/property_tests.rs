//! Property-based tests for default deny, termination and the depth ceiling

mod common;

use bastion_authz::model::Role;
use bastion_authz::store::RoleStore;
use bastion_authz::EvalContext;
use common::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_empty_store_denies_everything(
        principal_id in "[a-z]{1,12}",
        resource_type in "[a-z_]{1,10}",
        resource_id in "[a-z0-9*-]{0,10}",
        action in "[a-z*]{1,8}"
    ) {
        tokio_test::block_on(async {
            let fx = fixture();
            let decision = fx
                .engine
                .evaluate(&principal_id, &resource_type, &resource_id, &action, &EvalContext::new())
                .await
                .unwrap();
            assert!(!decision.allowed);
        });
    }

    #[test]
    fn test_arbitrary_parent_graphs_terminate(
        parents in prop::collection::vec(prop::option::of(0usize..12), 1..12),
        seed in 0usize..12
    ) {
        tokio_test::block_on(async {
            let fx = uncached_fixture();
            let n = parents.len();
            for (i, parent) in parents.iter().enumerate() {
                let mut role = Role::global(format!("r{}", i)).with_id(format!("r{}", i));
                // Self edges are rejected at write time
                role.parent_id = parent
                    .map(|p| p % n)
                    .filter(|p| *p != i)
                    .map(|p| format!("r{}", p));
                fx.store.insert_role(role).await.unwrap();
            }
            assign(&fx.store, "u1", &format!("r{}", seed % n)).await;

            let ctx = EvalContext::new();
            let roles = fx.engine.effective_roles("u1", &ctx).await.unwrap();
            assert!(!roles.roles.is_empty());
            assert!(roles.roles.len() <= n);
            assert!(roles.roles.iter().all(|r| r.depth <= 8));

            let decision = fx.engine.evaluate("u1", "document", "d", "read", &ctx).await.unwrap();
            assert!(!decision.allowed);
        });
    }

    #[test]
    fn test_grant_reachable_only_within_depth_ceiling(depth in 0usize..12) {
        tokio_test::block_on(async {
            let fx = uncached_fixture();
            for i in 0..=depth {
                let parent = (i < depth).then(|| format!("c{}", i + 1));
                role(&fx.store, &format!("c{}", i), parent.as_deref()).await;
            }
            assign(&fx.store, "u1", "c0").await;
            named_permission(&fx.store, &format!("c{}", depth), "document", None, "read").await;

            let decision = fx
                .engine
                .evaluate("u1", "document", "d", "read", &EvalContext::new())
                .await
                .unwrap();
            assert_eq!(decision.allowed, depth <= 8);
        });
    }

    #[test]
    fn test_decisions_are_deterministic(
        action in "(read|edit|delete)",
        resource_id in "doc-[0-9]{1,3}"
    ) {
        tokio_test::block_on(async {
            let fx = fixture();
            role(&fx.store, "editor", None).await;
            assign(&fx.store, "u1", "editor").await;
            named_permission(&fx.store, "editor", "document", None, "edit").await;
            direct_grant(&fx.store, "editor", "document", "doc-1", "delete").await;

            let ctx = EvalContext::new();
            let first = fx.engine.evaluate("u1", "document", &resource_id, &action, &ctx).await.unwrap();
            let second = fx.engine.evaluate("u1", "document", &resource_id, &action, &ctx).await.unwrap();

            assert_eq!(first.allowed, second.allowed);
            assert_eq!(first.reason, second.reason);
            assert!(second.cache_hit);
        });
    }
}
