//! Audit reading and permission grants.

use super::record_audit;
use crate::identigo::context::Context;
use crate::identigo::executor::Command;
use crate::identigo::failure::CommandError;
use crate::identigo::messages::MessageRef;
use crate::identigo::policy::{Action, PermissionSet};
use crate::identigo::session::PrincipalSession;
use crate::identigo::storage::AuditRecord;
use async_trait::async_trait;
use uuid::Uuid;

const AUDIT_PAGE_MAX: u32 = 500;

/// Newest-first page of audit records.
#[derive(Clone, Copy, Debug)]
pub struct AdminAuditRead {
    pub limit: u32,
}

#[async_trait]
impl Command for AdminAuditRead {
    type Response = Vec<AuditRecord>;

    fn name(&self) -> &'static str {
        "admin.audit-read"
    }

    async fn run(self, ctx: &mut Context) -> Result<Vec<AuditRecord>, CommandError> {
        let admin = ctx.require_admin()?;
        ctx.security_check(&Action::AdminAuditRead {
            acting: admin.actor(),
        })?;

        let limit = self.limit.clamp(1, AUDIT_PAGE_MAX);
        Ok(ctx.audit().read_latest(limit).await?)
    }
}

/// Grant one permission to another administrator.
///
/// The stored record is updated and so are any of the target's live
/// sessions, so the grant takes effect without a re-login.
#[derive(Clone, Debug)]
pub struct AdminPermissionGrant {
    pub admin_id: Uuid,
    pub permission: String,
}

#[derive(Clone, Copy, Debug)]
pub struct GrantOutcome {
    pub permissions: PermissionSet,
}

#[async_trait]
impl Command for AdminPermissionGrant {
    type Response = GrantOutcome;

    fn name(&self) -> &'static str {
        "admin.permission-grant"
    }

    async fn run(self, ctx: &mut Context) -> Result<GrantOutcome, CommandError> {
        let admin = ctx.require_admin()?;
        ctx.security_check(&Action::AdminPermissionGrant {
            acting: admin.actor(),
        })?;

        let Some(permission) = PermissionSet::parse(&self.permission) else {
            return Err(CommandError::Validation(MessageRef::with_args(
                "permission.unknown",
                vec![self.permission.clone()],
            )));
        };

        let Some(target) = ctx.admins().find_by_id(self.admin_id).await? else {
            return Err(CommandError::Validation(MessageRef::new("admin.unknown")));
        };
        let updated = target.permissions | permission;
        ctx.admins().update_permissions(target.id, updated).await?;

        for session in ctx.services().admin_sessions.find_by_principal(target.id) {
            session.grant(permission);
        }

        record_audit(
            ctx,
            admin.principal(),
            "admin.permission-grant",
            Some(target.id),
            format!("{permission}"),
        )
        .await?;

        Ok(GrantOutcome {
            permissions: updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AdminAuditRead, AdminPermissionGrant};
    use crate::identigo::commands::AdminUserRead;
    use crate::identigo::executor::execute;
    use crate::identigo::failure::codes;
    use crate::identigo::policy::PermissionSet;
    use crate::identigo::testkit::TestEnv;
    use uuid::Uuid;

    #[tokio::test]
    async fn audit_read_requires_the_permission_and_pages_newest_first() {
        let env = TestEnv::new();
        let auditor = env.seed_admin("audit@example.com", "pw not used 1", PermissionSet::AUDIT_READ);
        let granter = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::PERMISSION_GRANT,
        );

        // Two grants produce two audit entries with increasing timestamps.
        for permission in ["USER_READ", "AUDIT_READ"] {
            env.clock.advance(std::time::Duration::from_secs(1));
            let ctx = env.context(env.admin_session(&granter)).await;
            execute(
                ctx,
                AdminPermissionGrant {
                    admin_id: auditor.id,
                    permission: permission.to_string(),
                },
            )
            .await
            .expect("grant failed");
        }

        let ctx = env.context(env.admin_session(&auditor)).await;
        let denied = env.seed_admin("blind@example.com", "pw not used 1", PermissionSet::empty());
        let page = execute(ctx, AdminAuditRead { limit: 10 })
            .await
            .expect("audit read failed");
        assert_eq!(page.len(), 2);
        assert!(page[0].at >= page[1].at);
        assert_eq!(page[0].operation, "admin.permission-grant");

        let ctx = env.context(env.admin_session(&denied)).await;
        let failure = execute(ctx, AdminAuditRead { limit: 10 }).await.unwrap_err();
        assert_eq!(failure.code, codes::SECURITY_POLICY_DENIED);
        assert!(failure.message.contains("AUDIT_READ"));
    }

    #[tokio::test]
    async fn grant_takes_effect_on_live_sessions_without_relogin() {
        let env = TestEnv::new();
        let granter = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::PERMISSION_GRANT,
        );
        let operator = env.seed_admin("op@example.com", "pw not used 1", PermissionSet::empty());
        let operator_session = env.admin_session(&operator);
        let target = env.seed_user("alice@example.com", "sound password 9");

        // Denied before the grant, with the missing permission named.
        let ctx = env.context(operator_session.clone()).await;
        let failure = execute(ctx, AdminUserRead { user_id: target.id })
            .await
            .unwrap_err();
        assert!(failure.message.contains("USER_READ"));

        let ctx = env.context(env.admin_session(&granter)).await;
        let outcome = execute(
            ctx,
            AdminPermissionGrant {
                admin_id: operator.id,
                permission: "user_read".to_string(),
            },
        )
        .await
        .expect("grant failed");
        assert!(outcome.permissions.contains(PermissionSet::USER_READ));

        // Same live session now passes the check.
        let ctx = env.context(operator_session).await;
        let profile = execute(ctx, AdminUserRead { user_id: target.id })
            .await
            .expect("read still denied after grant");
        assert_eq!(profile.id, target.id);

        // The stored record was updated too.
        assert!(env
            .store
            .admin(operator.id)
            .expect("admin lost")
            .permissions
            .contains(PermissionSet::USER_READ));
    }

    #[tokio::test]
    async fn unknown_permission_and_unknown_admin_are_validation_errors() {
        let env = TestEnv::new();
        let granter = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::PERMISSION_GRANT,
        );

        let ctx = env.context(env.admin_session(&granter)).await;
        let failure = execute(
            ctx,
            AdminPermissionGrant {
                admin_id: granter.id,
                permission: "LAUNCH_MISSILES".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.code, codes::HTTP_PARAMETER_INVALID);
        assert!(failure.message.contains("LAUNCH_MISSILES"));

        let ctx = env.context(env.admin_session(&granter)).await;
        let failure = execute(
            ctx,
            AdminPermissionGrant {
                admin_id: Uuid::new_v4(),
                permission: "USER_READ".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.message, "No such administrator");
    }
}
