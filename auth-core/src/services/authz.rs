//! Role and attribute based authorization.
//!
//! Roles form an inheritance graph resolved by name at evaluation time, so a
//! change to a parent role is visible through every child without
//! re-registering it. Resolved permission sets are cached per sorted role-name
//! set and the whole cache is dropped on any registry change.

use chrono::Utc;
use dashmap::DashMap;
use ipnetwork::IpNetwork;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::audit::AuditEmitter;
use super::error::AuthError;
use crate::config::AuthzConfig;
use crate::models::{
    builtin_roles, Action, AuditActor, AuditEvent, AuditEventType, AuditOutcome, AuditResource,
    Permission, RoleDefinition, SessionContext, Severity, UserIdentity,
};
use crate::utils::pattern::ResourceMatcher;

/// A single access question.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub identity: UserIdentity,
    pub resource: String,
    pub action: Action,
    /// Attributes of the target resource, e.g. `ownerId`.
    pub attributes: HashMap<String, Value>,
    /// Client address, used when no session is supplied.
    pub ip_address: Option<String>,
    pub suppress_audit: bool,
}

impl AuthorizationRequest {
    pub fn new(identity: UserIdentity, resource: impl Into<String>, action: Action) -> Self {
        Self {
            identity,
            resource: resource.into(),
            action,
            attributes: HashMap::new(),
            ip_address: None,
            suppress_audit: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, Value>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn from_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn without_audit(mut self) -> Self {
        self.suppress_audit = true;
        self
    }
}

/// Allow/deny outcome. Denial is a value, not an error.
#[derive(Debug, Clone)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    /// Internal reason, suitable for logs and audit only.
    pub reason: String,
    pub matched_permission: Option<Permission>,
    pub elapsed: Duration,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>, matched: Option<Permission>, started: Instant) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            matched_permission: matched,
            elapsed: started.elapsed(),
        }
    }

    fn deny(reason: impl Into<String>, started: Instant) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            matched_permission: None,
            elapsed: started.elapsed(),
        }
    }
}

struct CachedPermissions {
    permissions: Arc<Vec<Permission>>,
    cached_at: Instant,
    /// Registry generation the set was resolved against.
    generation: u64,
}

pub struct AuthorizationService {
    config: AuthzConfig,
    roles: DashMap<String, RoleDefinition>,
    /// Keyed by the sorted, deduplicated role names.
    cache: DashMap<Vec<String>, CachedPermissions>,
    /// Bumped after every registry change. Entries from an older generation
    /// are treated as misses.
    generation: AtomicU64,
    matcher: ResourceMatcher,
    audit: AuditEmitter,
}

impl AuthorizationService {
    pub fn new(config: AuthzConfig, audit: AuditEmitter) -> Self {
        if !config.strict_mode {
            tracing::warn!("Authorization running in NON-STRICT mode: unmatched requests are allowed");
        }
        Self {
            config,
            roles: DashMap::new(),
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
            matcher: ResourceMatcher::new(),
            audit,
        }
    }

    /// Service with the built-in role ladder registered.
    pub fn with_builtin_roles(config: AuthzConfig, audit: AuditEmitter) -> Result<Self, AuthError> {
        let service = Self::new(config, audit);
        for role in builtin_roles() {
            service.register_role(role)?;
        }
        Ok(service)
    }

    pub fn register_role(&self, role: RoleDefinition) -> Result<(), AuthError> {
        if role.name.trim().is_empty() {
            return Err(AuthError::InvalidRole("role name must not be empty".to_string()));
        }
        if role.inherits.iter().any(|parent| parent == &role.name) {
            return Err(AuthError::InvalidRole(format!(
                "role '{}' cannot inherit from itself",
                role.name
            )));
        }
        if self.roles.get(&role.name).is_some_and(|r| r.is_system) {
            return Err(AuthError::InvalidRole(format!(
                "system role '{}' cannot be overwritten",
                role.name
            )));
        }
        if self.reaches(&role.inherits, &role.name) {
            return Err(AuthError::InvalidRole(format!(
                "role '{}' would create an inheritance cycle",
                role.name
            )));
        }

        for parent in &role.inherits {
            if !self.roles.contains_key(parent) {
                tracing::warn!(
                    role = %role.name,
                    parent = %parent,
                    "Parent role not registered yet"
                );
            }
        }

        let name = role.name.clone();
        let permissions = role.permissions.len();
        self.roles.insert(name.clone(), role);
        self.invalidate();

        tracing::info!(role = %name, permissions, "Role registered");
        self.audit_role_change(AuditEventType::RoleRegistered, &name, "register");
        Ok(())
    }

    /// Remove a non-system role. Returns false if it was not registered.
    pub fn unregister_role(&self, name: &str) -> Result<bool, AuthError> {
        if self.roles.get(name).is_some_and(|r| r.is_system) {
            return Err(AuthError::InvalidRole(format!(
                "system role '{}' cannot be removed",
                name
            )));
        }

        let removed = self.roles.remove(name).is_some();
        if removed {
            self.invalidate();
            tracing::info!(role = %name, "Role unregistered");
            self.audit_role_change(AuditEventType::RoleUnregistered, name, "unregister");
        }
        Ok(removed)
    }

    /// Append a permission to a registered non-system role.
    pub fn add_permission(&self, role_name: &str, permission: Permission) -> Result<(), AuthError> {
        {
            let Some(mut role) = self.roles.get_mut(role_name) else {
                return Err(AuthError::InvalidRole(format!("unknown role '{}'", role_name)));
            };
            if role.is_system {
                return Err(AuthError::InvalidRole(format!(
                    "system role '{}' cannot be modified",
                    role_name
                )));
            }
            role.permissions.push(permission);
        }
        self.invalidate();
        self.audit_role_change(AuditEventType::RoleRegistered, role_name, "add_permission");
        Ok(())
    }

    pub fn get_role(&self, name: &str) -> Option<RoleDefinition> {
        self.roles.get(name).map(|r| r.value().clone())
    }

    /// Registered roles, highest priority first.
    pub fn list_roles(&self) -> Vec<RoleDefinition> {
        let mut roles: Vec<RoleDefinition> = self.roles.iter().map(|r| r.value().clone()).collect();
        roles.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        roles
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.matcher.clear();
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
    }

    /// True if walking up from `parents` through registered roles reaches
    /// `target`.
    fn reaches(&self, parents: &[String], target: &str) -> bool {
        let mut stack: Vec<String> = parents.to_vec();
        let mut visited = HashSet::new();
        while let Some(name) = stack.pop() {
            if name == target {
                return true;
            }
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(role) = self.roles.get(&name) {
                stack.extend(role.inherits.iter().cloned());
            }
        }
        false
    }

    /// Union of the permissions of `role_names` and every role they inherit
    /// from, bounded by the configured inheritance depth.
    pub fn get_effective_permissions(&self, role_names: &[String]) -> Vec<Permission> {
        self.effective_permissions(role_names).as_ref().clone()
    }

    fn effective_permissions(&self, role_names: &[String]) -> Arc<Vec<Permission>> {
        let mut names: Vec<String> = role_names.to_vec();
        names.sort_unstable();
        names.dedup();
        let ttl = Duration::from_millis(self.config.cache_ttl_ms);

        // Read before resolving: a registry change during resolution leaves
        // the new entry tagged with an outdated generation.
        let generation = self.generation.load(Ordering::SeqCst);

        if self.config.cache_enabled {
            if let Some(cached) = self.cache.get(&names) {
                if cached.generation == generation && cached.cached_at.elapsed() < ttl {
                    return Arc::clone(&cached.permissions);
                }
            }
        }

        let mut visited = HashSet::new();
        let mut permissions = Vec::new();
        for name in &names {
            self.collect(name, 0, &mut visited, &mut permissions);
        }
        let permissions = Arc::new(permissions);

        if self.config.cache_enabled && self.generation.load(Ordering::SeqCst) == generation {
            self.cache.insert(
                names,
                CachedPermissions {
                    permissions: Arc::clone(&permissions),
                    cached_at: Instant::now(),
                    generation,
                },
            );
        }
        permissions
    }

    fn collect(
        &self,
        name: &str,
        depth: usize,
        visited: &mut HashSet<String>,
        out: &mut Vec<Permission>,
    ) {
        if depth > self.config.max_inheritance_depth {
            tracing::warn!(
                role = %name,
                max_depth = self.config.max_inheritance_depth,
                "Inheritance depth limit reached, ignoring deeper roles"
            );
            return;
        }
        if !visited.insert(name.to_string()) {
            return;
        }

        let Some((own, parents)) = self
            .roles
            .get(name)
            .map(|r| (r.permissions.clone(), r.inherits.clone()))
        else {
            tracing::debug!(role = %name, "Unknown role skipped");
            return;
        };

        for permission in own {
            if !out.contains(&permission) {
                out.push(permission);
            }
        }
        for parent in &parents {
            self.collect(parent, depth + 1, visited, out);
        }
    }

    /// Convenience check without session context. Not audited.
    pub fn check_permission(&self, identity: &UserIdentity, resource: &str, action: Action) -> bool {
        let request = AuthorizationRequest::new(identity.clone(), resource, action).without_audit();
        self.authorize(&request, None).allowed
    }

    /// Decide whether `request` is allowed, given the caller's session if any.
    pub fn authorize(
        &self,
        request: &AuthorizationRequest,
        session: Option<&SessionContext>,
    ) -> AuthorizationDecision {
        let started = Instant::now();
        let decision = self.evaluate(request, session, started);

        if decision.allowed {
            tracing::debug!(
                user_id = %request.identity.user_id,
                resource = %request.resource,
                action = %request.action,
                reason = %decision.reason,
                "Access allowed"
            );
        } else {
            tracing::info!(
                user_id = %request.identity.user_id,
                resource = %request.resource,
                action = %request.action,
                reason = %decision.reason,
                "Access denied"
            );
        }

        if !request.suppress_audit {
            let mut actor = AuditActor::user(&request.identity.user_id);
            if let Some(session) = session {
                actor = actor
                    .with_session(&session.session_id)
                    .with_client(&session.fingerprint.ip_address, &session.fingerprint.user_agent);
            } else if let Some(ip) = &request.ip_address {
                actor.ip_address = Some(ip.clone());
            }
            let matched = decision
                .matched_permission
                .as_ref()
                .map(|p| format!("{}:{}", p.resource, p.action));
            self.audit.emit(AuditEvent::authorization_decision(
                actor,
                &request.resource,
                request.action.as_str(),
                decision.allowed,
                &decision.reason,
                matched.as_deref(),
                decision.elapsed.as_micros(),
            ));
        }

        decision
    }

    fn evaluate(
        &self,
        request: &AuthorizationRequest,
        session: Option<&SessionContext>,
        started: Instant,
    ) -> AuthorizationDecision {
        if let Some(violation) = self.constraint_violation(request, session) {
            return AuthorizationDecision::deny(violation, started);
        }

        let permissions = self.effective_permissions(&request.identity.roles);
        let context = evaluation_context(request, session);

        let matched = permissions.iter().find(|p| {
            p.action == request.action
                && self.matcher.matches(&p.resource, &request.resource)
                && conditions_met(p, &request.attributes, &context)
        });

        match matched {
            Some(permission) => AuthorizationDecision::allow(
                format!("granted by {}:{}", permission.resource, permission.action),
                Some(permission.clone()),
                started,
            ),
            None if self.config.strict_mode => {
                AuthorizationDecision::deny("no matching permission", started)
            }
            None => {
                tracing::warn!(
                    user_id = %request.identity.user_id,
                    resource = %request.resource,
                    action = %request.action,
                    "No matching permission, allowing because strict mode is disabled"
                );
                AuthorizationDecision::allow("non-strict mode fallback", None, started)
            }
        }
    }

    /// First constraint violated by any role assigned directly to the caller.
    fn constraint_violation(
        &self,
        request: &AuthorizationRequest,
        session: Option<&SessionContext>,
    ) -> Option<String> {
        let identity = &request.identity;
        for role_name in &identity.roles {
            let Some(constraints) = self
                .roles
                .get(role_name)
                .and_then(|r| r.constraints.clone())
            else {
                continue;
            };

            if constraints.require_mfa && !identity.mfa_verified {
                return Some(format!("role '{}' requires MFA", role_name));
            }

            if let (Some(max), Some(session)) = (constraints.max_risk_score, session) {
                if session.risk_score > max {
                    return Some(format!(
                        "session risk {:.2} exceeds role '{}' limit {:.2}",
                        session.risk_score, role_name, max
                    ));
                }
            }

            if !constraints.allowed_ip_ranges.is_empty() {
                let ip = session
                    .map(|s| s.fingerprint.ip_address.as_str())
                    .or(request.ip_address.as_deref());
                let allowed = ip.is_some_and(|ip| ip_in_ranges(ip, &constraints.allowed_ip_ranges));
                if !allowed {
                    return Some(format!(
                        "client address not allowed for role '{}'",
                        role_name
                    ));
                }
            }
        }
        None
    }

    fn audit_role_change(&self, event_type: AuditEventType, role: &str, action: &str) {
        self.audit.emit(AuditEvent::new(
            event_type,
            Severity::Info,
            AuditActor::user("system"),
            AuditResource::new("role", Some(role.to_string())),
            action,
            AuditOutcome::Success,
        ));
    }
}

fn ip_in_ranges(ip: &str, ranges: &[String]) -> bool {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        return false;
    };
    ranges.iter().any(|range| match range.parse::<IpNetwork>() {
        Ok(network) => network.contains(addr),
        Err(_) => {
            tracing::warn!(range = %range, "Invalid IP range in role constraints");
            false
        }
    })
}

/// Context condition paths resolve against: `user.*`, `session.*`,
/// `resource.*` and `environment.*`.
fn evaluation_context(request: &AuthorizationRequest, session: Option<&SessionContext>) -> Value {
    let mut resource = Map::new();
    resource.insert("name".to_string(), json!(request.resource));
    for (key, value) in &request.attributes {
        resource.insert(key.clone(), value.clone());
    }

    let session_value = session.map_or(Value::Null, |s| {
        json!({
            "sessionId": s.session_id,
            "riskScore": s.risk_score,
            "mfaVerified": s.mfa_verified,
            "ipAddress": s.fingerprint.ip_address,
            "deviceId": s.fingerprint.device_id,
        })
    });

    let ip_address = session
        .map(|s| s.fingerprint.ip_address.clone())
        .or_else(|| request.ip_address.clone());

    json!({
        "user": {
            "userId": request.identity.user_id,
            "roles": request.identity.roles,
            "mfaVerified": request.identity.mfa_verified,
        },
        "session": session_value,
        "resource": Value::Object(resource),
        "environment": {
            "timestamp": Utc::now().to_rfc3339(),
            "ipAddress": ip_address,
            "riskScore": session.map_or(0.0, |s| s.risk_score),
        },
    })
}

const CONTEXT_ROOTS: [&str; 4] = ["user", "session", "resource", "environment"];

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    context
        .pointer(&format!("/{}", path.replace('.', "/")))
        .filter(|v| !v.is_null())
}

/// Resolve a `${path}` reference; other values are returned as-is.
fn resolve<'a>(expected: &'a Value, context: &'a Value) -> Option<&'a Value> {
    match expected
        .as_str()
        .and_then(|s| s.strip_prefix("${"))
        .and_then(|s| s.strip_suffix('}'))
    {
        Some(path) => lookup(context, path),
        None => Some(expected),
    }
}

fn conditions_met(
    permission: &Permission,
    attributes: &HashMap<String, Value>,
    context: &Value,
) -> bool {
    let Some(conditions) = &permission.conditions else {
        return true;
    };

    conditions.iter().all(|(key, expected)| {
        let is_path = key
            .split_once('.')
            .is_some_and(|(root, _)| CONTEXT_ROOTS.contains(&root));
        let actual = if is_path {
            lookup(context, key)
        } else {
            attributes.get(key).filter(|v| !v.is_null())
        };
        let Some(actual) = actual else {
            return false;
        };

        match expected {
            Value::Array(options) => options
                .iter()
                .any(|option| resolve(option, context) == Some(actual)),
            _ => resolve(expected, context) == Some(actual),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleConstraints;
    use chrono::Duration as ChronoDuration;

    fn service() -> AuthorizationService {
        AuthorizationService::new(AuthzConfig::default(), AuditEmitter::disabled())
    }

    fn identity(roles: &[&str]) -> UserIdentity {
        UserIdentity::new("u1", roles.iter().map(|r| r.to_string()).collect(), false)
    }

    #[test]
    fn test_register_validation() {
        let service = service();
        assert!(service.register_role(RoleDefinition::new(" ", vec![])).is_err());
        assert!(service
            .register_role(RoleDefinition::new("loop", vec![]).inheriting(&["loop"]))
            .is_err());

        service
            .register_role(RoleDefinition::new("locked", vec![]).system())
            .expect("register");
        assert!(matches!(
            service.register_role(RoleDefinition::new("locked", vec![])),
            Err(AuthError::InvalidRole(_))
        ));
        assert!(service.unregister_role("locked").is_err());
    }

    #[test]
    fn test_cycle_through_registered_roles_refused() {
        let service = service();
        service
            .register_role(RoleDefinition::new("a", vec![]).inheriting(&["b"]))
            .expect("a");
        service
            .register_role(RoleDefinition::new("b", vec![]).inheriting(&["c"]))
            .expect("b");
        let result = service.register_role(RoleDefinition::new("c", vec![]).inheriting(&["a"]));
        assert!(matches!(result, Err(AuthError::InvalidRole(_))));
    }

    #[test]
    fn test_depth_limit_bounds_resolution() {
        let config = AuthzConfig {
            max_inheritance_depth: 2,
            ..AuthzConfig::default()
        };
        let service = AuthorizationService::new(config, AuditEmitter::disabled());
        for (name, parent) in [("r0", None), ("r1", Some("r0")), ("r2", Some("r1")), ("r3", Some("r2"))] {
            let role = RoleDefinition::new(name, vec![Permission::new(name, Action::Read)]);
            let role = match parent {
                Some(p) => role.inheriting(&[p]),
                None => role,
            };
            service.register_role(role).expect("register");
        }

        let permissions = service.get_effective_permissions(&["r3".to_string()]);
        let resources: Vec<&str> = permissions.iter().map(|p| p.resource.as_str()).collect();
        assert_eq!(resources, vec!["r3", "r2", "r1"]);
    }

    #[test]
    fn test_cache_is_invalidated_on_change() {
        let service = service();
        service
            .register_role(RoleDefinition::new("base", vec![Permission::new("a", Action::Read)]))
            .expect("register");
        let names = vec!["base".to_string()];
        assert_eq!(service.get_effective_permissions(&names).len(), 1);
        assert_eq!(service.cache.len(), 1);

        service
            .add_permission("base", Permission::new("b", Action::Read))
            .expect("add");
        assert!(service.cache.is_empty());
        assert_eq!(service.get_effective_permissions(&names).len(), 2);
    }

    #[test]
    fn test_entry_from_older_generation_is_a_miss() {
        let service = service();
        service
            .register_role(RoleDefinition::new("temp", vec![Permission::new("a", Action::Read)]))
            .expect("register");
        let names = vec!["temp".to_string()];
        assert_eq!(service.get_effective_permissions(&names).len(), 1);

        // A resolution that raced the removal can still land in the cache
        // after it was cleared.
        service.roles.remove("temp");
        service.generation.fetch_add(1, Ordering::SeqCst);
        assert_eq!(service.cache.len(), 1);

        assert!(service.get_effective_permissions(&names).is_empty());
        assert!(!service.check_permission(&identity(&["temp"]), "a", Action::Read));
    }

    #[test]
    fn test_cache_keys_do_not_collide_on_commas() {
        let service = service();
        service
            .register_role(RoleDefinition::new("a,b", vec![Permission::new("joined", Action::Read)]))
            .expect("register");
        service
            .register_role(RoleDefinition::new("a", vec![Permission::new("first", Action::Read)]))
            .expect("register");
        service
            .register_role(RoleDefinition::new("b", vec![Permission::new("second", Action::Read)]))
            .expect("register");

        let joined = service.get_effective_permissions(&["a,b".to_string()]);
        let split = service.get_effective_permissions(&["a".to_string(), "b".to_string()]);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].resource, "joined");
        let resources: Vec<&str> = split.iter().map(|p| p.resource.as_str()).collect();
        assert_eq!(resources, vec!["first", "second"]);
        assert_eq!(service.cache.len(), 2);
    }

    #[test]
    fn test_condition_forms() {
        let service = service();
        service
            .register_role(RoleDefinition::new(
                "editor",
                vec![
                    Permission::new("doc", Action::Update)
                        .with_condition("status", json!(["draft", "review"]))
                        .with_condition("user.mfaVerified", json!(true)),
                    Permission::new("doc", Action::Read)
                        .with_condition("teamId", json!("${resource.ownerTeam}")),
                ],
            ))
            .expect("register");

        let mut editor = identity(&["editor"]);
        let update = |identity: &UserIdentity, status: &str| {
            AuthorizationRequest::new(identity.clone(), "doc", Action::Update)
                .with_attribute("status", json!(status))
                .without_audit()
        };
        assert!(!service.authorize(&update(&editor, "draft"), None).allowed);
        editor.mfa_verified = true;
        assert!(service.authorize(&update(&editor, "review"), None).allowed);
        assert!(!service.authorize(&update(&editor, "published"), None).allowed);

        let read = AuthorizationRequest::new(editor.clone(), "doc", Action::Read)
            .with_attribute("teamId", json!("t1"))
            .with_attribute("ownerTeam", json!("t1"));
        assert!(service.authorize(&read, None).allowed);
        let read = read.with_attribute("ownerTeam", json!("t2"));
        assert!(!service.authorize(&read, None).allowed);
    }

    #[test]
    fn test_risk_and_ip_constraints() {
        let service = service();
        service
            .register_role(
                RoleDefinition::new("ops", vec![Permission::new("console", Action::Execute)])
                    .with_constraints(RoleConstraints {
                        require_mfa: false,
                        max_risk_score: Some(0.3),
                        allowed_ip_ranges: vec!["10.0.0.0/8".to_string()],
                    }),
            )
            .expect("register");

        let mut session = SessionContext::new(
            "u1",
            vec!["ops".to_string()],
            false,
            crate::models::DeviceFingerprint::new("d", "10.1.2.3", "agent"),
            ChronoDuration::hours(1),
        );
        let request = AuthorizationRequest::new(identity(&["ops"]), "console", Action::Execute);
        assert!(service.authorize(&request, Some(&session)).allowed);

        session.risk_score = 0.5;
        let decision = service.authorize(&request, Some(&session));
        assert!(!decision.allowed);
        assert!(decision.reason.contains("risk"));

        session.risk_score = 0.0;
        session.fingerprint.ip_address = "192.168.1.1".to_string();
        assert!(!service.authorize(&request, Some(&session)).allowed);

        // Without a session the request address is used, and an unknown one is refused.
        assert!(!service.authorize(&request, None).allowed);
        let from_lan = request.clone().from_ip("10.9.9.9");
        assert!(service.authorize(&from_lan, None).allowed);
    }

    #[test]
    fn test_ip_ranges_accept_single_addresses() {
        assert!(ip_in_ranges("203.0.113.7", &["203.0.113.7".to_string()]));
        assert!(!ip_in_ranges("203.0.113.8", &["203.0.113.7".to_string()]));
        assert!(!ip_in_ranges("not-an-ip", &["0.0.0.0/0".to_string()]));
    }

    #[test]
    fn test_non_strict_allows_unmatched() {
        let config = AuthzConfig {
            strict_mode: false,
            ..AuthzConfig::default()
        };
        let service = AuthorizationService::new(config, AuditEmitter::disabled());
        let decision = service.authorize(
            &AuthorizationRequest::new(identity(&["nobody"]), "vault", Action::Delete),
            None,
        );
        assert!(decision.allowed);
        assert!(decision.matched_permission.is_none());
    }
}
