//! Security policy engine.
//!
//! Authorization is a pure function from an [`Action`] to a
//! [`PolicyResult`]. Actions are transient per-request values carrying
//! exactly the actor data needed for the decision; the engine performs no
//! I/O and holds no mutable state, so it is safe to call from any task
//! without synchronization. Authorization fails closed: anything without an
//! affirmative rule is denied, never an error.

mod permission;

pub use permission::PermissionSet;

use uuid::Uuid;

/// The acting end user behind a self-service action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserActor {
    pub id: Uuid,
}

/// The acting administrator behind an administrative action, with the
/// permission set granted at the time the action was constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdminActor {
    pub id: Uuid,
    pub permissions: PermissionSet,
}

/// Every authorizable operation, tagged with its actor.
#[derive(Clone, Debug)]
pub enum Action {
    UserNameUpdate { acting: UserActor },
    UserPasswordChange { acting: UserActor },
    UserEmailAddBegin { acting: UserActor },
    UserEmailAddConfirm { acting: UserActor },
    UserEmailAddDeny { acting: UserActor },
    UserProfileRead { acting: UserActor },
    AdminUserCreate { acting: AdminActor },
    AdminUserRead { acting: AdminActor },
    AdminUserUpdate { acting: AdminActor },
    AdminUserDelete { acting: AdminActor },
    AdminAuditRead { acting: AdminActor },
    AdminPermissionGrant { acting: AdminActor },
}

impl Action {
    /// Operation tag for logs and audit records.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserNameUpdate { .. } => "user.name-update",
            Self::UserPasswordChange { .. } => "user.password-change",
            Self::UserEmailAddBegin { .. } => "user.email-add-begin",
            Self::UserEmailAddConfirm { .. } => "user.email-add-confirm",
            Self::UserEmailAddDeny { .. } => "user.email-add-deny",
            Self::UserProfileRead { .. } => "user.profile-read",
            Self::AdminUserCreate { .. } => "admin.user-create",
            Self::AdminUserRead { .. } => "admin.user-read",
            Self::AdminUserUpdate { .. } => "admin.user-update",
            Self::AdminUserDelete { .. } => "admin.user-delete",
            Self::AdminAuditRead { .. } => "admin.audit-read",
            Self::AdminPermissionGrant { .. } => "admin.permission-grant",
        }
    }
}

/// Permitted, or denied with a human-readable reason. No partial results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyResult {
    Permitted,
    Denied { reason: String },
}

impl PolicyResult {
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_permitted(&self) -> bool {
        matches!(self, Self::Permitted)
    }
}

/// Swappable policy capability; deployments may substitute a stricter or
/// more permissive implementation without changing callers.
pub trait PolicyType: Send + Sync {
    fn check(&self, action: &Action) -> PolicyResult;
}

/// Standard policy: self-service is permitted (authentication already
/// established identity and the operation only touches the caller's own
/// resources); administrative operations are membership tests against the
/// actor's expanded permission set.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl PolicyType for DefaultPolicy {
    fn check(&self, action: &Action) -> PolicyResult {
        match action {
            Action::UserNameUpdate { .. }
            | Action::UserPasswordChange { .. }
            | Action::UserEmailAddBegin { .. }
            | Action::UserEmailAddConfirm { .. }
            | Action::UserEmailAddDeny { .. }
            | Action::UserProfileRead { .. } => PolicyResult::Permitted,
            Action::AdminUserCreate { acting } => require(acting, PermissionSet::USER_CREATE),
            Action::AdminUserRead { acting } => require(acting, PermissionSet::USER_READ),
            Action::AdminUserUpdate { acting } => require(acting, PermissionSet::USER_UPDATE),
            Action::AdminUserDelete { acting } => require(acting, PermissionSet::USER_DELETE),
            Action::AdminAuditRead { acting } => require(acting, PermissionSet::AUDIT_READ),
            Action::AdminPermissionGrant { acting } => {
                require(acting, PermissionSet::PERMISSION_GRANT)
            }
        }
    }
}

/// Restrictive policy for locked-down deployments: read-style operations
/// only, everything else falls through to the default-deny arm.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOnlyPolicy;

impl PolicyType for ReadOnlyPolicy {
    fn check(&self, action: &Action) -> PolicyResult {
        match action {
            Action::UserProfileRead { .. } => PolicyResult::Permitted,
            Action::AdminUserRead { acting } => require(acting, PermissionSet::USER_READ),
            Action::AdminAuditRead { acting } => require(acting, PermissionSet::AUDIT_READ),
            _ => PolicyResult::denied("operation not permitted"),
        }
    }
}

fn require(acting: &AdminActor, needed: PermissionSet) -> PolicyResult {
    if acting.permissions.expand().contains(needed) {
        PolicyResult::Permitted
    } else {
        PolicyResult::denied(format!("operation requires the {needed} permission"))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Action, AdminActor, DefaultPolicy, PermissionSet, PolicyResult, PolicyType,
        ReadOnlyPolicy, UserActor,
    };
    use uuid::Uuid;

    fn admin(permissions: PermissionSet) -> AdminActor {
        AdminActor {
            id: Uuid::new_v4(),
            permissions,
        }
    }

    fn every_action(admin: AdminActor, user: UserActor) -> Vec<Action> {
        vec![
            Action::UserNameUpdate { acting: user },
            Action::UserPasswordChange { acting: user },
            Action::UserEmailAddBegin { acting: user },
            Action::UserEmailAddConfirm { acting: user },
            Action::UserEmailAddDeny { acting: user },
            Action::UserProfileRead { acting: user },
            Action::AdminUserCreate { acting: admin },
            Action::AdminUserRead { acting: admin },
            Action::AdminUserUpdate { acting: admin },
            Action::AdminUserDelete { acting: admin },
            Action::AdminAuditRead { acting: admin },
            Action::AdminPermissionGrant { acting: admin },
        ]
    }

    #[test]
    fn policy_is_total_over_every_variant() {
        let user = UserActor { id: Uuid::new_v4() };
        for action in every_action(admin(PermissionSet::empty()), user) {
            // A result, never a panic; unauthorized admin actions are Denied.
            let _ = DefaultPolicy.check(&action);
            let _ = ReadOnlyPolicy.check(&action);
        }
    }

    #[test]
    fn self_service_is_unconditionally_permitted() {
        let user = UserActor { id: Uuid::new_v4() };
        assert!(DefaultPolicy
            .check(&Action::UserNameUpdate { acting: user })
            .is_permitted());
        assert!(DefaultPolicy
            .check(&Action::UserEmailAddBegin { acting: user })
            .is_permitted());
    }

    #[test]
    fn missing_permission_is_denied_with_its_name() {
        let action = Action::AdminUserRead {
            acting: admin(PermissionSet::AUDIT_READ),
        };
        match DefaultPolicy.check(&action) {
            PolicyResult::Denied { reason } => assert!(reason.contains("USER_READ")),
            PolicyResult::Permitted => panic!("expected denial"),
        }
    }

    #[test]
    fn granting_the_permission_flips_the_result() {
        let without = Action::AdminUserRead {
            acting: admin(PermissionSet::empty()),
        };
        assert!(!DefaultPolicy.check(&without).is_permitted());

        let with = Action::AdminUserRead {
            acting: admin(PermissionSet::USER_READ),
        };
        assert!(DefaultPolicy.check(&with).is_permitted());
    }

    #[test]
    fn implied_read_satisfies_read_checks() {
        let action = Action::AdminUserRead {
            acting: admin(PermissionSet::USER_UPDATE),
        };
        assert!(DefaultPolicy.check(&action).is_permitted());
    }

    #[test]
    fn read_only_policy_denies_mutation_by_default() {
        let action = Action::AdminUserCreate {
            acting: admin(PermissionSet::all()),
        };
        match ReadOnlyPolicy.check(&action) {
            PolicyResult::Denied { reason } => assert_eq!(reason, "operation not permitted"),
            PolicyResult::Permitted => panic!("expected denial"),
        }
    }
}
