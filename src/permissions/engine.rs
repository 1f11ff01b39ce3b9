//! The Permission Engine (C2): catalog management and `check_permission` evaluation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::audit::{AuditEvent, AuditEventType, AuditLevel, AuditLogger, AuditSeverity};

use super::access::{AccessDecision, AccessRequest, AccessResult};
use super::cache::PermissionCache;
use super::conditions::{self, EvalContext, Value};
use super::error::{PermissionError, PermissionResult};
use super::model::{Permission, PermissionScope, PermissionType, PolicyEffect, PolicyRule, Role, RoleType};

/// Tunables for the Permission Engine.
#[derive(Debug, Clone)]
pub struct PermissionEngineConfig {
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for PermissionEngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
        }
    }
}

/// Point-in-time counters for `check_permission` traffic.
#[derive(Debug, Default, Clone)]
pub struct PermissionStats {
    pub total_checks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub allowed: u64,
    pub denied: u64,
}

#[derive(Debug, Default)]
struct AtomicPermissionStats {
    total_checks: std::sync::atomic::AtomicU64,
    cache_hits: std::sync::atomic::AtomicU64,
    cache_misses: std::sync::atomic::AtomicU64,
    allowed: std::sync::atomic::AtomicU64,
    denied: std::sync::atomic::AtomicU64,
}

impl AtomicPermissionStats {
    fn snapshot(&self) -> PermissionStats {
        use std::sync::atomic::Ordering::Relaxed;
        PermissionStats {
            total_checks: self.total_checks.load(Relaxed),
            cache_hits: self.cache_hits.load(Relaxed),
            cache_misses: self.cache_misses.load(Relaxed),
            allowed: self.allowed.load(Relaxed),
            denied: self.denied.load(Relaxed),
        }
    }
}

/// The catalog (permissions/roles/policy rules) plus cached, condition-driven
/// evaluation of access requests.
pub struct PermissionEngine {
    permissions: DashMap<String, Permission>,
    roles: DashMap<String, Role>,
    user_roles: DashMap<String, HashSet<String>>,
    policy_rules: RwLock<Vec<PolicyRule>>,
    cache: PermissionCache,
    audit: Option<Arc<AuditLogger>>,
    stats: AtomicPermissionStats,
}

impl PermissionEngine {
    pub fn new(config: PermissionEngineConfig, audit: Option<Arc<AuditLogger>>) -> Self {
        let engine = Self {
            permissions: DashMap::new(),
            roles: DashMap::new(),
            user_roles: DashMap::new(),
            policy_rules: RwLock::new(Vec::new()),
            cache: PermissionCache::new(config.cache_ttl, config.cache_capacity),
            audit,
            stats: AtomicPermissionStats::default(),
        };
        engine.seed_defaults();
        engine
    }

    /// The baseline catalog: basic permissions, the nine `RoleType` roles, and two
    /// illustrative policy rules (guest write denial, admin allow-all).
    fn seed_defaults(&self) {
        let base_permissions = [
            Permission::new("read_basic", PermissionType::Read, PermissionScope::Global, "basic read access"),
            Permission::new("write_basic", PermissionType::Write, PermissionScope::Global, "basic write access"),
            Permission::new("execute_basic", PermissionType::Execute, PermissionScope::Global, "basic execute access"),
            Permission::new("admin_full", PermissionType::Admin, PermissionScope::Global, "full administrative access"),
            Permission::new("system_config", PermissionType::SystemConfig, PermissionScope::Global, "system configuration access"),
            Permission::new("adapter_manage", PermissionType::AdapterConfigure, PermissionScope::Global, "adapter management access"),
            Permission::new("model_access", PermissionType::ModelAccess, PermissionScope::Global, "model access"),
        ];
        for perm in base_permissions {
            self.permissions.insert(perm.name.clone(), perm);
        }

        let roles = [
            Role::new("guest", RoleType::Guest, "guest role", ["read_basic".to_string()]),
            Role::new("user", RoleType::User, "standard user role", ["read_basic".to_string(), "write_basic".to_string()]),
            Role::new(
                "developer",
                RoleType::Developer,
                "developer role",
                ["read_basic", "write_basic", "execute_basic", "adapter_manage"].map(str::to_string),
            ),
            Role::new(
                "admin",
                RoleType::Admin,
                "administrator role",
                ["read_basic", "write_basic", "execute_basic", "adapter_manage", "system_config"].map(str::to_string),
            ),
            Role::new(
                "super_admin",
                RoleType::SuperAdmin,
                "super administrator role",
                ["admin_full", "system_config", "adapter_manage", "model_access"].map(str::to_string),
            ),
            Role::new("analyst", RoleType::Analyst, "analyst role", ["read_basic".to_string()]),
            Role::new("operator", RoleType::Operator, "operator role", ["read_basic".to_string(), "execute_basic".to_string()]),
            Role::new("service", RoleType::Service, "service account role", ["read_basic".to_string(), "execute_basic".to_string()]),
            Role::new("system", RoleType::System, "system account role", ["admin_full".to_string()]),
        ];
        for role in roles {
            self.roles.insert(role.name.clone(), role);
        }

        let mut rules = self.policy_rules.write();
        rules.push(PolicyRule::new(
            "deny_guest_write",
            "guests cannot write, delete, or create",
            "user_role == 'guest' and action in ['write', 'delete', 'create']",
            PolicyEffect::Deny,
            100,
        ));
        rules.push(PolicyRule::new(
            "allow_admin_all",
            "administrators bypass RBAC/ABAC evaluation",
            "user_role == 'admin' or user_role == 'super_admin'",
            PolicyEffect::Permit,
            50,
        ));
        // A blanket "permit during working hours" rule is deliberately not seeded
        // here: at priority 10 it would outrank nothing but would still grant any
        // unauthenticated subject read access for a third of the day, undercutting
        // the default-deny posture every other phase relies on. Time-windowed
        // access stays available as an ABAC check (`evaluate_abac`) and as the
        // `time_between` condition function for catalog authors who want it
        // scoped to a specific role or resource.
    }

    // ---- Permission catalog ----

    pub fn create_permission(&self, permission: Permission) -> PermissionResult<()> {
        if self.permissions.contains_key(&permission.name) {
            return Err(PermissionError::PermissionExists(permission.name));
        }
        self.permissions.insert(permission.name.clone(), permission);
        self.cache.clear();
        Ok(())
    }

    /// Replace an existing permission in place, preserving no prior state —
    /// callers that want to tweak one field should read it via
    /// [`Self::get_permission`], mutate the clone, and pass it back here.
    pub fn update_permission(&self, permission: Permission) -> PermissionResult<()> {
        if !self.permissions.contains_key(&permission.name) {
            return Err(PermissionError::PermissionNotFound(permission.name));
        }
        self.permissions.insert(permission.name.clone(), permission);
        self.cache.clear();
        Ok(())
    }

    pub fn delete_permission(&self, name: &str) -> PermissionResult<()> {
        if self.permissions.remove(name).is_none() {
            return Err(PermissionError::PermissionNotFound(name.to_string()));
        }
        for mut role in self.roles.iter_mut() {
            role.permissions.remove(name);
        }
        self.cache.clear();
        Ok(())
    }

    pub fn get_permission(&self, name: &str) -> Option<Permission> {
        self.permissions.get(name).map(|p| p.clone())
    }

    pub fn list_permissions(&self) -> Vec<Permission> {
        self.permissions.iter().map(|p| p.clone()).collect()
    }

    // ---- Role catalog ----

    pub fn create_role(&self, role: Role) -> PermissionResult<()> {
        if self.roles.contains_key(&role.name) {
            return Err(PermissionError::RoleExists(role.name));
        }
        let unknown: Vec<String> = role
            .permissions
            .iter()
            .filter(|p| !self.permissions.contains_key(*p))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(PermissionError::UnknownPermissions(role.name, unknown));
        }
        self.assert_no_cycle(&role.name, &role.parent_roles)?;
        self.roles.insert(role.name.clone(), role);
        self.cache.clear();
        Ok(())
    }

    /// Replace an existing role in place, re-running the same unknown-permission
    /// and hierarchy-cycle checks [`Self::create_role`] does.
    pub fn update_role(&self, role: Role) -> PermissionResult<()> {
        if !self.roles.contains_key(&role.name) {
            return Err(PermissionError::RoleNotFound(role.name));
        }
        let unknown: Vec<String> = role
            .permissions
            .iter()
            .filter(|p| !self.permissions.contains_key(*p))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(PermissionError::UnknownPermissions(role.name, unknown));
        }
        self.assert_no_cycle(&role.name, &role.parent_roles)?;
        self.roles.insert(role.name.clone(), role);
        self.cache.clear();
        Ok(())
    }

    fn assert_no_cycle(&self, role_name: &str, parents: &HashSet<String>) -> PermissionResult<()> {
        let mut visited = HashSet::new();
        let mut stack: Vec<String> = parents.iter().cloned().collect();
        while let Some(parent) = stack.pop() {
            if parent == role_name {
                return Err(PermissionError::RoleCycle(role_name.to_string()));
            }
            if !visited.insert(parent.clone()) {
                continue;
            }
            if let Some(parent_role) = self.roles.get(&parent) {
                stack.extend(parent_role.parent_roles.iter().cloned());
            }
        }
        Ok(())
    }

    pub fn delete_role(&self, name: &str) -> PermissionResult<()> {
        if self.roles.remove(name).is_none() {
            return Err(PermissionError::RoleNotFound(name.to_string()));
        }
        for mut entry in self.user_roles.iter_mut() {
            entry.remove(name);
        }
        self.cache.clear();
        Ok(())
    }

    pub fn get_role(&self, name: &str) -> Option<Role> {
        self.roles.get(name).map(|r| r.clone())
    }

    pub fn list_roles(&self) -> Vec<Role> {
        self.roles.iter().map(|r| r.clone()).collect()
    }

    // ---- User-role assignment ----

    pub fn assign_role(&self, user_id: &str, role_name: &str) -> PermissionResult<()> {
        if !self.roles.contains_key(role_name) {
            return Err(PermissionError::RoleNotFound(role_name.to_string()));
        }
        self.user_roles
            .entry(user_id.to_string())
            .or_default()
            .insert(role_name.to_string());
        self.cache.clear();
        Ok(())
    }

    pub fn revoke_role(&self, user_id: &str, role_name: &str) {
        if let Some(mut roles) = self.user_roles.get_mut(user_id) {
            roles.remove(role_name);
        }
        self.cache.clear();
    }

    pub fn get_user_roles(&self, user_id: &str) -> HashSet<String> {
        self.user_roles.get(user_id).map(|r| r.clone()).unwrap_or_default()
    }

    /// The union of a user's direct and role-hierarchy-inherited permissions.
    pub fn get_user_permissions(&self, user_id: &str) -> HashSet<String> {
        let mut permissions = HashSet::new();
        let mut visited = HashSet::new();
        for role_name in self.get_user_roles(user_id) {
            self.collect_role_permissions(&role_name, &mut permissions, &mut visited);
        }
        permissions
    }

    fn collect_role_permissions(
        &self,
        role_name: &str,
        permissions: &mut HashSet<String>,
        visited: &mut HashSet<String>,
    ) {
        if !visited.insert(role_name.to_string()) {
            return;
        }
        let Some(role) = self.roles.get(role_name) else {
            return;
        };
        if !role.is_active {
            return;
        }
        permissions.extend(role.permissions.iter().cloned());
        for parent in role.parent_roles.clone() {
            self.collect_role_permissions(&parent, permissions, visited);
        }
    }

    // ---- Policy rule catalog ----

    pub fn create_policy_rule(&self, rule: PolicyRule) -> PermissionResult<()> {
        let mut rules = self.policy_rules.write();
        if rules.iter().any(|r| r.name == rule.name) {
            return Err(PermissionError::PolicyRuleExists(rule.name));
        }
        rules.push(rule);
        drop(rules);
        self.cache.clear();
        Ok(())
    }

    /// Replace an existing policy rule in place, keyed by `rule.name`.
    pub fn update_policy_rule(&self, rule: PolicyRule) -> PermissionResult<()> {
        let mut rules = self.policy_rules.write();
        let Some(slot) = rules.iter_mut().find(|r| r.name == rule.name) else {
            return Err(PermissionError::PolicyRuleNotFound(rule.name));
        };
        *slot = rule;
        drop(rules);
        self.cache.clear();
        Ok(())
    }

    pub fn delete_policy_rule(&self, name: &str) -> PermissionResult<()> {
        let mut rules = self.policy_rules.write();
        let before = rules.len();
        rules.retain(|r| r.name != name);
        if rules.len() == before {
            return Err(PermissionError::PolicyRuleNotFound(name.to_string()));
        }
        drop(rules);
        self.cache.clear();
        Ok(())
    }

    pub fn list_policy_rules(&self) -> Vec<PolicyRule> {
        self.policy_rules.read().clone()
    }

    // ---- Evaluation ----

    /// Check whether `request` is permitted: policy rules, then RBAC, then ABAC, in
    /// that order, with the first non-abstain decision winning; an all-abstain
    /// result is a default deny.
    pub async fn check_permission(&self, request: &AccessRequest) -> AccessResult {
        let start = Instant::now();
        self.stats.total_checks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let cache_key = request.cache_key();
        if let Some(cached) = self.cache.get(&cache_key) {
            self.stats.cache_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return cached;
        }
        self.stats.cache_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let ctx = self.build_eval_context(request);

        let mut result = self.evaluate_policy_rules(&ctx);
        if result.decision == AccessDecision::Abstain {
            result = self.evaluate_rbac(request, &ctx);
        }
        if result.decision == AccessDecision::Abstain {
            result = self.evaluate_abac(request, &ctx);
        }
        if result.decision == AccessDecision::Abstain {
            result = AccessResult::deny("no matching permission found - default deny");
        }

        result.evaluation_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result.decision {
            AccessDecision::Allow => {
                self.stats.allowed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            _ => {
                self.stats.denied.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        self.cache.set(cache_key, result.clone());
        self.audit_decision(request, &result).await;
        result
    }

    async fn audit_decision(&self, request: &AccessRequest, result: &AccessResult) {
        let Some(audit) = &self.audit else { return };
        let event_type = if result.granted() {
            AuditEventType::AccessGranted
        } else {
            AuditEventType::AccessDenied
        };
        let event = AuditEvent::new(
            event_type,
            format!("{}: {}", result.decision_label(), result.reason),
            AuditLevel::Info,
            AuditSeverity::Low,
        )
        .with_user(request.user_id.clone())
        .with_component("permission_engine");
        let _ = audit.log_event(event).await;
    }

    fn build_eval_context(&self, request: &AccessRequest) -> EvalContext {
        let user_roles = self.get_user_roles(&request.user_id);
        let user_permissions = self.get_user_permissions(&request.user_id);
        let mut ctx = EvalContext::new();
        ctx.set("user_id", Value::Str(request.user_id.clone()));
        ctx.set("resource", Value::Str(request.resource.clone()));
        ctx.set("action", Value::Str(request.action.clone()));
        ctx.set(
            "user_role",
            Value::Str(user_roles.iter().next().cloned().unwrap_or_else(|| "guest".to_string())),
        );
        ctx.set("user_roles", Value::List(user_roles.into_iter().collect()));
        ctx.set("user_permissions", Value::List(user_permissions.into_iter().collect()));
        if let Some(ip) = &request.ip_address {
            ctx.set("ip_address", Value::Str(ip.clone()));
        }
        for (k, v) in &request.context {
            ctx.set(k.clone(), Value::Str(v.clone()));
        }
        ctx
    }

    fn evaluate_policy_rules(&self, ctx: &EvalContext) -> AccessResult {
        let mut rules: Vec<PolicyRule> = self
            .policy_rules
            .read()
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        for rule in rules {
            if conditions::evaluate_str(&rule.condition, ctx) {
                match rule.effect {
                    PolicyEffect::Permit => {
                        return AccessResult::allow(format!("policy rule allowed: {}", rule.name))
                            .with_conditions_evaluated(vec![rule.name]);
                    }
                    PolicyEffect::Deny => {
                        return AccessResult::deny(format!("policy rule denied: {}", rule.name))
                            .with_conditions_evaluated(vec![rule.name]);
                    }
                    // The rule matched but declines to decide; keep evaluating
                    // lower-priority rules instead of short-circuiting.
                    PolicyEffect::Indeterminate => continue,
                }
            }
        }
        AccessResult::abstain("no policy rules matched")
    }

    fn evaluate_rbac(&self, request: &AccessRequest, ctx: &EvalContext) -> AccessResult {
        let user_permissions = self.get_user_permissions(&request.user_id);
        for name in &user_permissions {
            let Some(permission) = self.permissions.get(name) else {
                continue;
            };
            if !permission.permission_type.satisfies_action(&request.action) {
                continue;
            }
            if !permission.matches_resource(&request.resource) {
                continue;
            }
            if permission
                .conditions
                .iter()
                .all(|c| conditions::evaluate_str(c, ctx))
            {
                return AccessResult::allow(format!("RBAC permission granted: {name}"))
                    .with_permissions_used(vec![name.clone()]);
            }
        }
        AccessResult::abstain("no RBAC permissions matched")
    }

    fn evaluate_abac(&self, request: &AccessRequest, ctx: &EvalContext) -> AccessResult {
        if let Some(owner) = request.context.get("resource_owner") {
            if owner == &request.user_id {
                return AccessResult::allow("resource owner access granted")
                    .with_conditions_evaluated(vec!["resource_owner".to_string()]);
            }
        }
        if !conditions::evaluate_str("time_between('06:00', '23:00')", ctx) {
            return AccessResult::deny("access denied outside allowed hours")
                .with_conditions_evaluated(vec!["time_restriction".to_string()]);
        }
        AccessResult::abstain("no ABAC conditions matched")
    }

    pub fn get_stats(&self) -> PermissionStats {
        self.stats.snapshot()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cleanup_expired_cache(&self) {
        self.cache.cleanup_expired();
    }

    /// Export the catalog as a plain-data snapshot; see DESIGN.md's resolution of
    /// the catalog-persistence open question — no file format is defined, this is
    /// purely an in-process seam for an external collaborator to persist.
    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            permissions: self.permissions.iter().map(|p| p.clone()).collect(),
            roles: self.roles.iter().map(|r| r.clone()).collect(),
            user_roles: self
                .user_roles
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            policy_rules: self.policy_rules.read().clone(),
        }
    }

    pub fn restore(&self, snapshot: CatalogSnapshot) {
        self.permissions.clear();
        for permission in snapshot.permissions {
            self.permissions.insert(permission.name.clone(), permission);
        }
        self.roles.clear();
        for role in snapshot.roles {
            self.roles.insert(role.name.clone(), role);
        }
        self.user_roles.clear();
        for (user_id, roles) in snapshot.user_roles {
            self.user_roles.insert(user_id, roles);
        }
        *self.policy_rules.write() = snapshot.policy_rules;
        self.cache.clear();
    }
}

impl AccessResult {
    fn decision_label(&self) -> &'static str {
        match self.decision {
            AccessDecision::Allow => "allowed",
            AccessDecision::Deny => "denied",
            AccessDecision::Abstain => "abstained",
            AccessDecision::Conditional => "conditional",
        }
    }
}

/// A plain-data export of the full catalog, see [`PermissionEngine::snapshot`].
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub permissions: Vec<Permission>,
    pub roles: Vec<Role>,
    pub user_roles: HashMap<String, HashSet<String>>,
    pub policy_rules: Vec<PolicyRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PermissionEngine {
        PermissionEngine::new(PermissionEngineConfig::default(), None)
    }

    #[tokio::test]
    async fn guest_cannot_write() {
        let engine = engine();
        engine.assign_role("alice", "guest").unwrap_or(());
        let request = AccessRequest::new("alice", "files/a.txt", "write");
        let result = engine.check_permission(&request).await;
        assert!(!result.granted());
    }

    #[tokio::test]
    async fn user_role_can_write_basic() {
        let engine = engine();
        engine.assign_role("bob", "user").unwrap_or(());
        let request = AccessRequest::new("bob", "files/a.txt", "write");
        let result = engine.check_permission(&request).await;
        assert!(result.granted());
    }

    #[tokio::test]
    async fn admin_policy_rule_allows_all() {
        let engine = engine();
        engine.assign_role("carol", "admin").unwrap_or(());
        let request = AccessRequest::new("carol", "anything", "delete");
        let result = engine.check_permission(&request).await;
        assert!(result.granted());
    }

    #[tokio::test]
    async fn unknown_user_defaults_to_deny() {
        let engine = engine();
        let request = AccessRequest::new("stranger", "files/a.txt", "read");
        let result = engine.check_permission(&request).await;
        assert!(!result.granted());
    }

    #[tokio::test]
    async fn resource_owner_grants_abac_access() {
        let engine = engine();
        let request = AccessRequest::new("dave", "documents/1", "read")
            .with_context("resource_owner", "dave");
        let result = engine.check_permission(&request).await;
        assert!(result.granted());
    }

    #[test]
    fn role_hierarchy_cycle_is_rejected() {
        let engine = engine();
        engine.create_role(Role::new("a", RoleType::User, "a", []).inheriting_from("b")).unwrap_or(());
        let result = engine.create_role(Role::new("b", RoleType::User, "b", []).inheriting_from("a"));
        assert!(result.is_err());
    }

    #[test]
    fn update_permission_requires_it_to_already_exist() {
        let engine = engine();
        let result = engine.update_permission(Permission::new(
            "does_not_exist",
            PermissionType::Read,
            PermissionScope::Global,
            "nope",
        ));
        assert!(matches!(result, Err(PermissionError::PermissionNotFound(_))));
    }

    #[test]
    fn update_permission_replaces_the_existing_entry() {
        let engine = engine();
        let updated = Permission::new("read_basic", PermissionType::Read, PermissionScope::Global, "updated")
            .with_resource_pattern("files/*");
        engine.update_permission(updated).unwrap_or(());
        let stored = engine.get_permission("read_basic");
        assert_eq!(stored.map(|p| p.description), Some("updated".to_string()));
    }

    #[test]
    fn update_role_rejects_unknown_permissions() {
        let engine = engine();
        let result = engine.update_role(Role::new("guest", RoleType::Guest, "guest", ["no_such_permission".to_string()]));
        assert!(matches!(result, Err(PermissionError::UnknownPermissions(_, _))));
    }

    #[test]
    fn update_role_rejects_introduced_cycle() {
        let engine = engine();
        engine.create_role(Role::new("a", RoleType::User, "a", [])).unwrap_or(());
        let result = engine.update_role(Role::new("a", RoleType::User, "a", []).inheriting_from("a"));
        assert!(result.is_err());
    }

    #[test]
    fn update_policy_rule_requires_it_to_already_exist() {
        let engine = engine();
        let result = engine.update_policy_rule(PolicyRule::new("missing", "d", "true", PolicyEffect::Deny, 0));
        assert!(matches!(result, Err(PermissionError::PolicyRuleNotFound(_))));
    }

    #[test]
    fn update_policy_rule_replaces_condition_and_effect() {
        let engine = engine();
        engine
            .update_policy_rule(PolicyRule::new(
                "deny_guest_write",
                "now permits instead",
                "user_role == 'guest' and action in ['write', 'delete', 'create']",
                PolicyEffect::Permit,
                100,
            ))
            .unwrap_or(());
        let rules = engine.list_policy_rules();
        let rule = rules.iter().find(|r| r.name == "deny_guest_write");
        assert_eq!(rule.map(|r| r.effect), Some(PolicyEffect::Permit));
    }

    #[tokio::test]
    async fn indeterminate_policy_rule_falls_through_to_the_next_rule() {
        let engine = engine();
        engine
            .create_policy_rule(PolicyRule::new(
                "undecided_for_everyone",
                "always matches but never decides",
                "true",
                PolicyEffect::Indeterminate,
                1000,
            ))
            .unwrap_or(());
        engine.assign_role("carol", "admin").unwrap_or(());
        let request = AccessRequest::new("carol", "anything", "delete");
        let result = engine.check_permission(&request).await;
        assert!(result.granted());
    }

    #[test]
    fn snapshot_restore_round_trips_catalog() {
        let engine = engine();
        engine.assign_role("eve", "developer").unwrap_or(());
        let snapshot = engine.snapshot();
        let restored = PermissionEngine::new(PermissionEngineConfig::default(), None);
        restored.restore(snapshot);
        assert!(restored.get_user_roles("eve").contains("developer"));
    }
}
