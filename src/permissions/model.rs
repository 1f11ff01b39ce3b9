//! Catalog data types: permissions, roles, and policy rules.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The action family a [`Permission`] grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Read,
    Write,
    Delete,
    Execute,
    Create,
    Update,
    Admin,
    SuperAdmin,
    UserManage,
    RoleManage,
    PermissionManage,
    SystemConfig,
    SystemMonitor,
    SystemBackup,
    SystemRestore,
    SystemShutdown,
    AdapterInstall,
    AdapterUninstall,
    AdapterConfigure,
    AdapterExecute,
    AdapterDebug,
    ModelAccess,
    ModelTrain,
    ModelDeploy,
    ModelDelete,
    ModelExport,
    DataRead,
    DataWrite,
    DataDelete,
    DataExport,
    DataImport,
    NetworkAccess,
    NetworkAdmin,
    FileRead,
    FileWrite,
    FileDelete,
    FileExecute,
}

impl PermissionType {
    /// The [`PermissionType`]s that satisfy a plain request action string
    /// (`"read"`, `"write"`, ...). `ADMIN` satisfies every action.
    pub fn satisfies_action(self, action: &str) -> bool {
        if self == PermissionType::Admin {
            return true;
        }
        matches!(
            (self, action.to_ascii_lowercase().as_str()),
            (PermissionType::Read, "read")
                | (PermissionType::Write, "write")
                | (PermissionType::Delete, "delete")
                | (PermissionType::Execute, "execute")
                | (PermissionType::Create, "create")
                | (PermissionType::Update, "update")
        )
    }
}

/// The tier at which a [`Permission`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    Global,
    Tenant,
    Project,
    Resource,
    Instance,
}

/// A role's broad category, used for cosmetic grouping and default-catalog seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    SuperAdmin,
    Admin,
    Developer,
    Analyst,
    Operator,
    User,
    Guest,
    Service,
    System,
}

/// Outcome a matching [`PolicyRule`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    Permit,
    Deny,
    /// The rule matched but declines to decide; evaluation falls through to the
    /// next rule rather than short-circuiting, distinct from the condition
    /// simply being false (which skips the rule entirely).
    Indeterminate,
}

/// A named, resource-scoped capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub permission_type: PermissionType,
    pub scope: PermissionScope,
    pub description: String,
    /// A `glob`-syntax pattern (`"files/*"`, `"**"`); `None` matches every resource.
    pub resource_pattern: Option<String>,
    pub conditions: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        name: impl Into<String>,
        permission_type: PermissionType,
        scope: PermissionScope,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            permission_type,
            scope,
            description: description.into(),
            resource_pattern: None,
            conditions: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_resource_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.resource_pattern = Some(pattern.into());
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Whether this permission's resource pattern matches `resource`.
    pub fn matches_resource(&self, resource: &str) -> bool {
        match &self.resource_pattern {
            None => true,
            Some(pattern) => glob::Pattern::new(pattern)
                .map(|p| p.matches(resource))
                .unwrap_or(false),
        }
    }
}

/// A named bundle of permissions, optionally inheriting from parent roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub role_type: RoleType,
    pub description: String,
    pub permissions: std::collections::HashSet<String>,
    pub parent_roles: std::collections::HashSet<String>,
    pub conditions: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        role_type: RoleType,
        description: impl Into<String>,
        permissions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            role_type,
            description: description.into(),
            permissions: permissions.into_iter().collect(),
            parent_roles: std::collections::HashSet::new(),
            conditions: Vec::new(),
            metadata: HashMap::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn inheriting_from(mut self, parent: impl Into<String>) -> Self {
        self.parent_roles.insert(parent.into());
        self
    }
}

/// A prioritized condition → effect rule evaluated before RBAC/ABAC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub description: String,
    /// A condition-expression string, see [`crate::permissions::conditions`].
    pub condition: String,
    pub effect: PolicyEffect,
    /// Higher priority rules are evaluated first.
    pub priority: i32,
    pub is_active: bool,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl PolicyRule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        condition: impl Into<String>,
        effect: PolicyEffect,
        priority: i32,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            condition: condition.into(),
            effect,
            priority,
            is_active: true,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_without_pattern_matches_everything() {
        let perm = Permission::new("read_basic", PermissionType::Read, PermissionScope::Global, "basic read");
        assert!(perm.matches_resource("anything/at/all"));
    }

    #[test]
    fn permission_with_glob_pattern_respects_it() {
        let perm = Permission::new("file_read", PermissionType::FileRead, PermissionScope::Resource, "file read")
            .with_resource_pattern("files/*.txt");
        assert!(perm.matches_resource("files/report.txt"));
        assert!(!perm.matches_resource("files/report.csv"));
    }

    #[test]
    fn admin_permission_type_satisfies_any_action() {
        assert!(PermissionType::Admin.satisfies_action("delete"));
        assert!(!PermissionType::Read.satisfies_action("write"));
    }
}
