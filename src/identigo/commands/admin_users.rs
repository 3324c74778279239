//! Administrative user management.

use super::{
    check_password_format, generate_one_shot_token, hash_password, hash_token, record_audit,
    require_valid_email,
};
use crate::identigo::context::Context;
use crate::identigo::email::EmailMessage;
use crate::identigo::executor::Command;
use crate::identigo::failure::CommandError;
use crate::identigo::messages::MessageRef;
use crate::identigo::policy::Action;
use crate::identigo::session::PrincipalSession;
use crate::identigo::storage::{AccountStatus, PendingToken, TokenPurpose, UserRecord};
use async_trait::async_trait;
use uuid::Uuid;

fn unknown_user() -> CommandError {
    CommandError::Validation(MessageRef::new("user.unknown"))
}

/// Create an account in `pending_verification` state and mail the owner a
/// one-shot activation token.
#[derive(Clone, Debug)]
pub struct AdminUserCreate {
    pub email: String,
    pub real_name: String,
    pub initial_password: String,
}

#[derive(Clone, Copy, Debug)]
pub struct CreatedUser {
    pub user_id: Uuid,
}

#[async_trait]
impl Command for AdminUserCreate {
    type Response = CreatedUser;

    fn name(&self) -> &'static str {
        "admin.user-create"
    }

    async fn run(self, ctx: &mut Context) -> Result<CreatedUser, CommandError> {
        let admin = ctx.require_admin()?;
        ctx.security_check(&Action::AdminUserCreate {
            acting: admin.actor(),
        })?;

        let email = require_valid_email(&self.email)?;
        check_password_format(&ctx.services().config, &self.initial_password)?;
        if ctx.users().find_by_email(&email).await?.is_some() {
            return Err(CommandError::Validation(MessageRef::new("user.email-taken")));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            email: email.clone(),
            real_name: self.real_name.trim().to_string(),
            status: AccountStatus::PendingVerification,
            password_hash: hash_password(&self.initial_password)?,
        };
        ctx.users().insert(&record).await?;

        let token = generate_one_shot_token();
        let expires_at =
            ctx.clock().wall() + chrono::Duration::seconds(ctx.services().config.token_ttl_seconds());
        let pending = PendingToken {
            user_id: record.id,
            purpose: TokenPurpose::EmailAdd,
            payload: email.clone(),
            expires_at,
        };
        ctx.users().insert_token(&hash_token(&token), &pending).await?;
        ctx.services()
            .mailer
            .send(&EmailMessage::verification(&email, &token))?;

        record_audit(
            ctx,
            admin.principal(),
            "admin.user-create",
            Some(record.id),
            email,
        )
        .await?;

        Ok(CreatedUser { user_id: record.id })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdminUserRead {
    pub user_id: Uuid,
}

#[derive(Clone, Debug)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub real_name: String,
    pub status: &'static str,
}

#[async_trait]
impl Command for AdminUserRead {
    type Response = UserProfile;

    fn name(&self) -> &'static str {
        "admin.user-read"
    }

    async fn run(self, ctx: &mut Context) -> Result<UserProfile, CommandError> {
        let admin = ctx.require_admin()?;
        ctx.security_check(&Action::AdminUserRead {
            acting: admin.actor(),
        })?;

        let user = ctx
            .users()
            .find_by_id(self.user_id)
            .await?
            .ok_or_else(unknown_user)?;
        Ok(UserProfile {
            id: user.id,
            email: user.email,
            real_name: user.real_name,
            status: user.status.as_str(),
        })
    }
}

/// Edit another account's name and/or email.
#[derive(Clone, Debug)]
pub struct AdminUserUpdate {
    pub user_id: Uuid,
    pub real_name: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
impl Command for AdminUserUpdate {
    type Response = ();

    fn name(&self) -> &'static str {
        "admin.user-update"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let admin = ctx.require_admin()?;
        ctx.security_check(&Action::AdminUserUpdate {
            acting: admin.actor(),
        })?;

        let mut changed = Vec::new();
        if let Some(real_name) = &self.real_name {
            if !ctx.users().update_real_name(self.user_id, real_name.trim()).await? {
                return Err(unknown_user());
            }
            changed.push("real_name");
        }
        if let Some(email) = &self.email {
            let email = require_valid_email(email)?;
            if let Some(existing) = ctx.users().find_by_email(&email).await? {
                if existing.id != self.user_id {
                    return Err(CommandError::Validation(MessageRef::new("user.email-taken")));
                }
            }
            if !ctx.users().update_email(self.user_id, &email).await? {
                return Err(unknown_user());
            }
            changed.push("email");
        }
        if changed.is_empty() {
            return Err(CommandError::Protocol(
                "update carries no fields".to_string(),
            ));
        }

        record_audit(
            ctx,
            admin.principal(),
            "admin.user-update",
            Some(self.user_id),
            changed.join(","),
        )
        .await?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdminUserDelete {
    pub user_id: Uuid,
}

#[async_trait]
impl Command for AdminUserDelete {
    type Response = ();

    fn name(&self) -> &'static str {
        "admin.user-delete"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let admin = ctx.require_admin()?;
        ctx.security_check(&Action::AdminUserDelete {
            acting: admin.actor(),
        })?;

        if !ctx.users().delete(self.user_id).await? {
            return Err(unknown_user());
        }
        record_audit(
            ctx,
            admin.principal(),
            "admin.user-delete",
            Some(self.user_id),
            "",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AdminUserCreate, AdminUserDelete, AdminUserRead, AdminUserUpdate};
    use crate::identigo::email::CapturingEmailSender;
    use crate::identigo::executor::execute;
    use crate::identigo::failure::codes;
    use crate::identigo::policy::PermissionSet;
    use crate::identigo::storage::AccountStatus;
    use crate::identigo::testkit::TestEnv;
    use std::sync::Arc;
    use uuid::Uuid;

    fn create_command(email: &str) -> AdminUserCreate {
        AdminUserCreate {
            email: email.to_string(),
            real_name: "New User".to_string(),
            initial_password: "sound password 9".to_string(),
        }
    }

    #[tokio::test]
    async fn create_requires_the_user_create_permission() {
        let env = TestEnv::new();
        let admin = env.seed_admin("root@example.com", "pw not used 1", PermissionSet::AUDIT_READ);
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let failure = execute(ctx, create_command("new@example.com"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, codes::SECURITY_POLICY_DENIED);
        assert!(failure.message.contains("USER_CREATE"));
    }

    #[tokio::test]
    async fn create_inserts_pending_user_mails_token_and_audits() {
        let mailer = Arc::new(CapturingEmailSender::new());
        let env = TestEnv::with_mailer(Arc::clone(&mailer) as _);
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_CREATE,
        );
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let created = execute(ctx, create_command("New@Example.com"))
            .await
            .expect("create failed");

        let stored = env.store.user(created.user_id).expect("user not stored");
        assert_eq!(stored.email, "new@example.com");
        assert_eq!(stored.status, AccountStatus::PendingVerification);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "verify_email");
        assert_eq!(env.store.audit_len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_before_insert() {
        let env = TestEnv::new();
        env.seed_user("taken@example.com", "sound password 9");
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_CREATE,
        );
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let failure = execute(ctx, create_command("taken@example.com"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, codes::HTTP_PARAMETER_INVALID);
        assert_eq!(failure.message, "The email address is already in use");
    }

    #[tokio::test]
    async fn weak_initial_password_is_a_password_error() {
        let env = TestEnv::new();
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_CREATE,
        );
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let failure = execute(
            ctx,
            AdminUserCreate {
                email: "new@example.com".to_string(),
                real_name: "New User".to_string(),
                initial_password: "short".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.code, codes::PASSWORD_ERROR);
        assert_eq!(failure.status, 400);
    }

    #[tokio::test]
    async fn read_reflects_implied_permissions() {
        let env = TestEnv::new();
        let target = env.seed_user("alice@example.com", "sound password 9");
        // USER_UPDATE implies USER_READ.
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_UPDATE,
        );
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let profile = execute(ctx, AdminUserRead { user_id: target.id })
            .await
            .expect("read failed");
        assert_eq!(profile.email, "alice@example.com");
        assert_eq!(profile.status, "active");
    }

    #[tokio::test]
    async fn read_of_missing_user_is_validation_not_storage() {
        let env = TestEnv::new();
        let admin = env.seed_admin("root@example.com", "pw not used 1", PermissionSet::USER_READ);
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let failure = execute(
            ctx,
            AdminUserRead {
                user_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.code, codes::HTTP_PARAMETER_INVALID);
        assert_eq!(failure.message, "No such user");
    }

    #[tokio::test]
    async fn update_changes_fields_and_audits() {
        let env = TestEnv::new();
        let target = env.seed_user("alice@example.com", "sound password 9");
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_UPDATE,
        );
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        execute(
            ctx,
            AdminUserUpdate {
                user_id: target.id,
                real_name: Some("Alice Renamed".to_string()),
                email: Some("renamed@example.com".to_string()),
            },
        )
        .await
        .expect("update failed");

        let stored = env.store.user(target.id).expect("user lost");
        assert_eq!(stored.real_name, "Alice Renamed");
        assert_eq!(stored.email, "renamed@example.com");
        assert_eq!(env.store.audit_len(), 1);
    }

    #[tokio::test]
    async fn empty_update_is_a_protocol_error() {
        let env = TestEnv::new();
        let target = env.seed_user("alice@example.com", "sound password 9");
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_UPDATE,
        );
        let session = env.admin_session(&admin);

        let ctx = env.context(session).await;
        let failure = execute(
            ctx,
            AdminUserUpdate {
                user_id: target.id,
                real_name: None,
                email: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.code, codes::PROTOCOL_ERROR);
        assert_eq!(failure.status, 400);
    }

    #[tokio::test]
    async fn delete_is_not_idempotent_at_the_command_level() {
        let env = TestEnv::new();
        let target = env.seed_user("alice@example.com", "sound password 9");
        let admin = env.seed_admin(
            "root@example.com",
            "pw not used 1",
            PermissionSet::USER_DELETE,
        );

        let ctx = env.context(env.admin_session(&admin)).await;
        execute(ctx, AdminUserDelete { user_id: target.id })
            .await
            .expect("delete failed");
        assert!(env.store.user(target.id).is_none());

        let ctx = env.context(env.admin_session(&admin)).await;
        let failure = execute(ctx, AdminUserDelete { user_id: target.id })
            .await
            .unwrap_err();
        assert_eq!(failure.message, "No such user");
    }

    #[tokio::test]
    async fn anonymous_caller_cannot_reach_admin_commands() {
        let env = TestEnv::new();
        let ctx = env.anonymous_context().await;
        let failure = execute(
            ctx,
            AdminUserRead {
                user_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.code, codes::SECURITY_POLICY_DENIED);
    }
}
