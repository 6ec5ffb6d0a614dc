//! Hierarchy resolver
//!
//! Resolution order:
//!
//! 1. Direct `UserRole` rows (inherited rows also need a live membership and
//!    a live group role on their source group)
//! 2. Group roles of every group the principal belongs to, and of the
//!    context group, plus their `GroupInheritance` ancestors in the same org
//! 3. Organization default roles when an organization is in context
//! 4. Role bindings, kept apart as conditional grants
//!
//! Every seed role is followed up its `parent_id` chain. A role reached twice
//! within one chain is a cycle: the branch stops and the set is flagged as
//! truncated. Chains longer than `max_depth` are cut the same way.
//!
//! Every time window consulted on the way (assignments, memberships, group
//! roles and inheritance edges) bounds the set's `valid_until`, including
//! windows that have not opened yet.

use super::{ConditionalGrant, EffectiveRole, EffectiveRoleSet, Provenance, DEFAULT_MAX_DEPTH};
use crate::error::{AuthzError, Result};
use crate::model::{BindingSubject, Role};
use crate::store::AccessStore;
use crate::types::{earliest, EvalContext, GroupId, RoleId, TimeWindow};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Default)]
struct RoleAccumulator {
    roles: Vec<EffectiveRole>,
    index: HashMap<RoleId, usize>,
    truncated: bool,
    valid_until: Option<DateTime<Utc>>,
}

impl RoleAccumulator {
    fn bound_by(&mut self, window: &TimeWindow, now: DateTime<Utc>) {
        self.valid_until = earliest(self.valid_until, window.next_transition(now));
    }
}

pub struct HierarchyResolver {
    store: Arc<dyn AccessStore>,
    max_depth: usize,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self::with_max_depth(store, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(store: Arc<dyn AccessStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Expand `principal_id` into its effective role set at `ctx.now`.
    ///
    /// An unknown principal resolves to an empty set. Store failures propagate.
    #[instrument(skip(self, ctx), fields(org = ?ctx.organization_id, group = ?ctx.group_id))]
    pub async fn resolve_effective_roles(
        &self,
        principal_id: &str,
        ctx: &EvalContext,
    ) -> Result<EffectiveRoleSet> {
        let now = ctx.now;
        let mut acc = RoleAccumulator::default();

        let mut member_groups: BTreeSet<GroupId> = BTreeSet::new();
        for membership in self.store.memberships_for_principal(principal_id).await? {
            if membership.is_active {
                acc.bound_by(&membership.window, now);
            }
            if membership.is_effective(now) {
                member_groups.insert(membership.group_id);
            }
        }

        // Direct and materialized assignments
        for user_role in self.store.user_roles_for(principal_id).await? {
            if user_role.is_active {
                acc.bound_by(&user_role.window, now);
            }
            if !user_role.is_effective(now) {
                continue;
            }
            let provenance = match &user_role.source_group_id {
                None => Provenance::Direct,
                Some(group_id) => {
                    if !member_groups.contains(group_id)
                        || !self
                            .group_grants_role(group_id, &user_role.role_id, now, &mut acc)
                            .await?
                    {
                        debug!(
                            "Skipping inherited role {} from group {}: source no longer effective",
                            user_role.role_id, group_id
                        );
                        continue;
                    }
                    Provenance::ViaGroup {
                        group_id: group_id.clone(),
                    }
                }
            };
            self.walk_chain(&user_role.role_id, provenance, ctx, &mut acc).await?;
        }

        // Group roles along membership and context group chains
        let mut roots: Vec<GroupId> = member_groups.into_iter().collect();
        if let Some(group_id) = &ctx.group_id {
            if !roots.contains(group_id) {
                roots.push(group_id.clone());
            }
        }
        let groups = self.inherited_groups(&roots, now, &mut acc).await?;
        for group_id in &groups {
            for group_role in self.store.group_roles_for(group_id).await? {
                if group_role.is_active {
                    acc.bound_by(&group_role.window, now);
                }
                if !group_role.is_effective(now) {
                    continue;
                }
                let provenance = Provenance::ViaGroup {
                    group_id: group_id.clone(),
                };
                self.walk_chain(&group_role.role_id, provenance, ctx, &mut acc).await?;
            }
        }

        // Organization defaults
        if let Some(organization_id) = &ctx.organization_id {
            for role in self.store.default_roles(organization_id).await? {
                let provenance = Provenance::ViaOrganization {
                    organization_id: organization_id.clone(),
                };
                self.walk_chain(&role.id, provenance, ctx, &mut acc).await?;
            }
        }

        let conditional = self
            .binding_grants(principal_id, &groups, ctx, &mut acc.truncated)
            .await?;

        debug!(
            "Resolved {} roles and {} conditional grants for {}",
            acc.roles.len(),
            conditional.len(),
            principal_id
        );

        Ok(EffectiveRoleSet {
            roles: acc.roles,
            conditional,
            truncated: acc.truncated,
            valid_until: acc.valid_until,
        })
    }

    /// Ancestors of `role_id`, nearest first, bounded by the depth ceiling
    pub async fn ancestors(&self, role_id: &str) -> Result<Vec<Role>> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([role_id.to_string()]);
        let mut next = self
            .store
            .get_role(role_id)
            .await?
            .and_then(|role| role.parent_id);

        while let Some(parent_id) = next.take() {
            if ancestors.len() >= self.max_depth || !seen.insert(parent_id.clone()) {
                warn!("Ancestor walk for {} stopped at {}", role_id, parent_id);
                break;
            }
            let Some(parent) = self.store.get_role(&parent_id).await? else {
                break;
            };
            next = parent.parent_id.clone();
            ancestors.push(parent);
        }

        Ok(ancestors)
    }

    /// Would making `parent_id` the parent of `child_id` close a cycle?
    pub async fn would_create_cycle(&self, child_id: &str, parent_id: &str) -> Result<bool> {
        if child_id == parent_id {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let mut next = Some(parent_id.to_string());
        while let Some(current) = next.take() {
            if current == child_id {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                // Pre-existing cycle above the parent; the child is not on it
                return Ok(false);
            }
            next = self
                .store
                .get_role(&current)
                .await?
                .and_then(|role| role.parent_id);
        }
        Ok(false)
    }

    /// `group_id` and every group inheriting from it, breadth first
    pub async fn group_subtree(&self, group_id: &str) -> Result<Vec<GroupId>> {
        let mut subtree = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(group_id.to_string(), 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            subtree.push(current.clone());
            if depth >= self.max_depth {
                continue;
            }
            for edge in self.store.inheritance_children(&current).await? {
                queue.push_back((edge.child_group_id, depth + 1));
            }
        }

        Ok(subtree)
    }

    /// Every principal with a membership row anywhere in `group_id`'s subtree
    pub async fn principals_in_subtree(&self, group_id: &str) -> Result<Vec<String>> {
        let mut principals = BTreeSet::new();
        for group in self.group_subtree(group_id).await? {
            for membership in self.store.members_of_group(&group).await? {
                principals.insert(membership.principal_id);
            }
        }
        Ok(principals.into_iter().collect())
    }

    async fn group_grants_role(
        &self,
        group_id: &str,
        role_id: &str,
        now: DateTime<Utc>,
        acc: &mut RoleAccumulator,
    ) -> Result<bool> {
        let mut granted = false;
        for group_role in self.store.group_roles_for(group_id).await? {
            if group_role.role_id != role_id || !group_role.is_active {
                continue;
            }
            acc.bound_by(&group_role.window, now);
            granted |= group_role.is_effective(now);
        }
        Ok(granted)
    }

    /// Live groups reachable upward from `roots` through effective
    /// inheritance edges, staying inside each root's organization
    async fn inherited_groups(
        &self,
        roots: &[GroupId],
        now: DateTime<Utc>,
        acc: &mut RoleAccumulator,
    ) -> Result<Vec<GroupId>> {
        let mut groups = Vec::new();
        let mut seen = HashSet::new();

        for root in roots {
            let mut queue = VecDeque::from([(root.clone(), 0usize, None::<String>)]);

            while let Some((group_id, depth, organization_id)) = queue.pop_front() {
                if depth > self.max_depth {
                    warn!(
                        "{}",
                        AuthzError::CycleOrDepthExceeded {
                            role_id: format!("group:{}", group_id),
                            depth,
                        }
                    );
                    acc.truncated = true;
                    continue;
                }
                if !seen.insert(group_id.clone()) {
                    continue;
                }

                let Some(group) = self.store.get_group(&group_id).await? else {
                    debug!("Group {} not found", group_id);
                    continue;
                };
                if !group.is_active {
                    continue;
                }
                if organization_id
                    .as_deref()
                    .is_some_and(|org| org != group.organization_id)
                {
                    debug!("Group {} is outside the inheriting organization", group_id);
                    continue;
                }

                groups.push(group.id.clone());
                for edge in self.store.inheritance_parents(&group.id).await? {
                    if edge.is_active {
                        acc.bound_by(&edge.window, now);
                    }
                    if edge.is_effective(now) {
                        queue.push_back((
                            edge.parent_group_id,
                            depth + 1,
                            Some(group.organization_id.clone()),
                        ));
                    }
                }
            }
        }

        Ok(groups)
    }

    async fn binding_grants(
        &self,
        principal_id: &str,
        groups: &[GroupId],
        ctx: &EvalContext,
        truncated: &mut bool,
    ) -> Result<Vec<ConditionalGrant>> {
        let mut bindings = self
            .store
            .bindings_for_subject(BindingSubject::User, principal_id)
            .await?;
        bindings.extend(
            self.store
                .bindings_for_subject(BindingSubject::Service, principal_id)
                .await?,
        );
        for group_id in groups {
            bindings.extend(
                self.store
                    .bindings_for_subject(BindingSubject::Group, group_id)
                    .await?,
            );
        }

        bindings.retain(|b| {
            b.is_active
                && ctx
                    .organization_id
                    .as_deref()
                    .map_or(true, |org| b.organization_id == org)
        });
        bindings.sort_by(|a, b| a.id.cmp(&b.id));
        bindings.dedup_by(|a, b| a.id == b.id);

        let mut grants = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let mut acc = RoleAccumulator::default();
            if let Some(role_id) = binding.role_id() {
                let provenance = Provenance::ViaBinding {
                    binding_id: binding.id.clone(),
                };
                self.walk_chain(role_id, provenance, ctx, &mut acc).await?;
                if acc.roles.is_empty() {
                    debug!("Binding {} references no live role", binding.id);
                    continue;
                }
            }
            *truncated |= acc.truncated;
            grants.push(ConditionalGrant {
                binding,
                roles: acc.roles,
            });
        }

        Ok(grants)
    }

    /// Add `start` and its ancestors to `acc`.
    ///
    /// A role already collected at the same or a shallower depth ends the
    /// walk, since its ancestors are already present.
    async fn walk_chain(
        &self,
        start: &str,
        provenance: Provenance,
        ctx: &EvalContext,
        acc: &mut RoleAccumulator,
    ) -> Result<()> {
        let mut chain: HashSet<RoleId> = HashSet::new();
        let mut current = Some((start.to_string(), provenance, 0usize));

        while let Some((role_id, provenance, depth)) = current.take() {
            if depth > self.max_depth {
                warn!(
                    "{}; truncating branch from {}",
                    AuthzError::CycleOrDepthExceeded {
                        role_id: role_id.clone(),
                        depth,
                    },
                    start
                );
                acc.truncated = true;
                break;
            }
            if !chain.insert(role_id.clone()) {
                warn!("Role hierarchy cycle detected at {} (reached from {})", role_id, start);
                acc.truncated = true;
                break;
            }

            if let Some(&idx) = acc.index.get(&role_id) {
                let existing = &mut acc.roles[idx];
                if !existing.provenance.contains(&provenance) {
                    existing.provenance.push(provenance);
                }
                if depth >= existing.depth {
                    break;
                }
                existing.depth = depth;
                current = existing.role.parent_id.clone().map(|parent_id| {
                    (parent_id, Provenance::ViaParent { child_role_id: role_id }, depth + 1)
                });
                continue;
            }

            let Some(role) = self.store.get_role(&role_id).await? else {
                debug!("Role {} not found", role_id);
                break;
            };
            if !role.is_live() {
                debug!("Role {} is inactive", role_id);
                break;
            }
            if let Some(organization_id) = &ctx.organization_id {
                if !role.visible_in(organization_id) {
                    debug!("Role {} is scoped to another organization", role_id);
                    break;
                }
            }

            let parent = role.parent_id.clone();
            acc.index.insert(role_id.clone(), acc.roles.len());
            acc.roles.push(EffectiveRole {
                role,
                provenance: vec![provenance],
                depth,
            });
            current = parent.map(|parent_id| {
                (parent_id, Provenance::ViaParent { child_role_id: role_id }, depth + 1)
            });
        }

        Ok(())
    }
}
