//! Identity Context: who is acting on a request.
//!
//! The transport layer turns the identity headers into an [`Identity`] and
//! wraps it in a [`RequestContext`] that lives for exactly one request.
//! Every core operation takes the context explicitly; a value supplied in
//! the request body always wins over the ambient identity.

use crate::error::{IdentityPart, WorkflowError};

/// Header carrying the acting user id.
pub const USER_HEADER: &str = "X-User-Id";
/// Header carrying a comma-separated role list.
pub const ROLES_HEADER: &str = "X-User-Roles";

/// The ambient identity of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    /// Lower-cased, de-duplicated, in first-seen order.
    pub roles: Vec<String>,
}

impl Identity {
    /// Build an identity from raw header values. Returns `None` when the
    /// headers carry neither a user nor any role.
    pub fn from_headers(user: Option<&str>, roles: Option<&str>) -> Option<Identity> {
        let user_id = non_blank(user).map(str::to_string);
        let roles = parse_roles(roles);
        if user_id.is_none() && roles.is_empty() {
            return None;
        }
        Some(Identity { user_id, roles })
    }

    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(String::as_str)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Parse a comma-separated role header.
///
/// Entries are trimmed and lower-cased; blanks are dropped and duplicates
/// keep their first position.
pub fn parse_roles(raw: Option<&str>) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    let Some(raw) = raw else {
        return roles;
    };
    for part in raw.split(',') {
        let role = part.trim().to_lowercase();
        if !role.is_empty() && !roles.contains(&role) {
            roles.push(role);
        }
    }
    roles
}

/// Request-scoped context handed to every core operation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(identity: Option<Identity>) -> Self {
        RequestContext { identity }
    }

    /// A context with no ambient identity; only explicit overrides resolve.
    pub fn anonymous() -> Self {
        RequestContext::default()
    }

    /// Shorthand for a context acting as `user_id` with the given roles.
    pub fn acting_as(user_id: &str, roles: &[&str]) -> Self {
        RequestContext::new(Identity::from_headers(
            Some(user_id),
            Some(&roles.join(",")),
        ))
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Resolve the acting user: a non-blank override wins, else the ambient
    /// user id.
    pub fn require_user_id(&self, override_value: Option<&str>) -> Result<String, WorkflowError> {
        resolve(override_value, || {
            self.identity.as_ref().and_then(|i| i.user_id.as_deref())
        })
        .ok_or(WorkflowError::MissingIdentity(IdentityPart::User))
    }

    /// Resolve the acting role: a non-blank override wins, else the ambient
    /// primary role.
    pub fn require_role(&self, override_value: Option<&str>) -> Result<String, WorkflowError> {
        resolve(override_value, || {
            self.identity.as_ref().and_then(Identity::primary_role)
        })
        .ok_or(WorkflowError::MissingIdentity(IdentityPart::Role))
    }
}

fn resolve<'a>(
    override_value: Option<&'a str>,
    ambient: impl FnOnce() -> Option<&'a str>,
) -> Option<String> {
    non_blank(override_value)
        .or_else(|| non_blank(ambient()))
        .map(str::to_string)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_trimmed_lowercased_and_deduplicated() {
        assert_eq!(
            parse_roles(Some(" Approver, executor ,APPROVER,, ")),
            vec!["approver".to_string(), "executor".to_string()]
        );
        assert!(parse_roles(Some("  ")).is_empty());
        assert!(parse_roles(None).is_empty());
    }

    #[test]
    fn headers_without_user_or_roles_give_no_identity() {
        assert_eq!(Identity::from_headers(None, None), None);
        assert_eq!(Identity::from_headers(Some("  "), Some(",")), None);
        let only_roles = Identity::from_headers(None, Some("executor")).unwrap();
        assert_eq!(only_roles.user_id, None);
        assert_eq!(only_roles.primary_role(), Some("executor"));
    }

    #[test]
    fn override_wins_over_ambient_identity() {
        let ctx = RequestContext::acting_as("alice", &["approver"]);
        assert_eq!(ctx.require_user_id(Some("  bob ")).unwrap(), "bob");
        assert_eq!(ctx.require_user_id(Some("   ")).unwrap(), "alice");
        assert_eq!(ctx.require_user_id(None).unwrap(), "alice");
        assert_eq!(ctx.require_role(Some("Executor")).unwrap(), "Executor");
        assert_eq!(ctx.require_role(None).unwrap(), "approver");
    }

    #[test]
    fn missing_identity_fails_closed() {
        let ctx = RequestContext::anonymous();
        assert!(matches!(
            ctx.require_user_id(None),
            Err(WorkflowError::MissingIdentity(IdentityPart::User))
        ));
        assert!(matches!(
            ctx.require_role(Some("")),
            Err(WorkflowError::MissingIdentity(IdentityPart::Role))
        ));

        let roles_only = RequestContext::new(Identity::from_headers(None, Some("approver")));
        assert!(roles_only.require_user_id(None).is_err());
        assert_eq!(roles_only.require_role(None).unwrap(), "approver");
    }

    #[test]
    fn has_role_ignores_case() {
        let identity = Identity::from_headers(Some("u"), Some("Approver")).unwrap();
        assert!(identity.has_role("APPROVER"));
        assert!(!identity.has_role("executor"));
    }
}
