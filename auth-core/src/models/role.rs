//! Role model - named permission sets with inheritance and constraints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Actions a permission can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Execute,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Execute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Execute => "execute",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "execute" => Ok(Action::Execute),
            _ => Err(format!("Invalid action: {}", s)),
        }
    }
}

/// A grant of one action on resources matching `resource`.
///
/// `resource` is an exact name, a `prefix:*` wildcard or a glob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<HashMap<String, serde_json::Value>>,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
            conditions: None,
        }
    }

    /// Add an attribute condition. Values may be literals, arrays (any of) or
    /// `${path}` references into the evaluation context.
    pub fn with_condition(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.conditions
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// One permission per action for the same resource pattern.
    pub fn all_actions(resource: &str) -> Vec<Permission> {
        Action::ALL
            .iter()
            .map(|action| Permission::new(resource, *action))
            .collect()
    }
}

/// Requirements a caller must meet before any permission of the role applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConstraints {
    #[serde(default)]
    pub require_mfa: bool,
    #[serde(default)]
    pub max_risk_score: Option<f64>,
    /// CIDR ranges (or single addresses) the session IP must fall within.
    #[serde(default)]
    pub allowed_ip_ranges: Vec<String>,
}

/// Role definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub permissions: Vec<Permission>,
    /// Parent role names whose permissions this role inherits.
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub constraints: Option<RoleConstraints>,
    #[serde(default)]
    pub priority: i32,
    /// System roles cannot be overwritten or removed once registered.
    #[serde(default)]
    pub is_system: bool,
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            permissions,
            inherits: Vec::new(),
            constraints: None,
            priority: 0,
            is_system: false,
        }
    }

    pub fn inheriting(mut self, parents: &[&str]) -> Self {
        self.inherits = parents.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_constraints(mut self, constraints: RoleConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}

/// The built-in role ladder: super_admin ⊃ admin ⊃ operator ⊃ user, plus the
/// independent readonly and guest roles.
pub fn builtin_roles() -> Vec<RoleDefinition> {
    let mfa_required = RoleConstraints {
        require_mfa: true,
        ..Default::default()
    };

    let user = RoleDefinition::new(
        "user",
        vec![
            Permission::new("profile", Action::Read)
                .with_condition("ownerId", serde_json::json!("${user.userId}")),
            Permission::new("profile", Action::Update)
                .with_condition("ownerId", serde_json::json!("${user.userId}")),
            Permission::new("sessions:own", Action::Read),
            Permission::new("sessions:own", Action::Delete),
            Permission::new("content:*", Action::Read),
        ],
    )
    .with_description("Standard authenticated user")
    .with_priority(10)
    .system();

    let mut operator_permissions = vec![
        Permission::new("system:*", Action::Read),
        Permission::new("system:*", Action::Execute),
        Permission::new("sessions:*", Action::Read),
        Permission::new("audit:*", Action::Read),
    ];
    operator_permissions.extend(Permission::all_actions("content:*"));
    let operator = RoleDefinition::new("operator", operator_permissions)
        .inheriting(&["user"])
        .with_description("Operations staff")
        .with_priority(50)
        .system();

    let mut admin_permissions = Permission::all_actions("users:*");
    admin_permissions.extend(Permission::all_actions("roles:*"));
    admin_permissions.extend(Permission::all_actions("sessions:*"));
    admin_permissions.push(Permission::new("profile", Action::Read));
    let admin = RoleDefinition::new("admin", admin_permissions)
        .inheriting(&["operator"])
        .with_constraints(mfa_required.clone())
        .with_description("Tenant administrator")
        .with_priority(90)
        .system();

    let super_admin = RoleDefinition::new("super_admin", Permission::all_actions("*"))
        .inheriting(&["admin"])
        .with_constraints(mfa_required)
        .with_description("Unrestricted platform administrator")
        .with_priority(100)
        .system();

    let readonly = RoleDefinition::new("readonly", vec![Permission::new("*", Action::Read)])
        .with_description("Read-only access to every resource")
        .with_priority(5)
        .system();

    let guest = RoleDefinition::new("guest", vec![Permission::new("public:*", Action::Read)])
        .with_description("Unauthenticated visitor")
        .with_priority(0)
        .system();

    vec![user, operator, admin, super_admin, readonly, guest]
}
