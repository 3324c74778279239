//! Self-service profile operations.

use super::{check_password_format, hash_password, verify_password};
use crate::identigo::context::Context;
use crate::identigo::executor::Command;
use crate::identigo::failure::CommandError;
use crate::identigo::messages::MessageRef;
use crate::identigo::policy::Action;
use crate::identigo::session::PrincipalSession;
use async_trait::async_trait;
use uuid::Uuid;

const REAL_NAME_MAX_CHARS: usize = 200;

fn unknown_user() -> CommandError {
    CommandError::Validation(MessageRef::new("user.unknown"))
}

/// Update the caller's own real name.
#[derive(Clone, Debug)]
pub struct UserNameUpdate {
    pub real_name: String,
}

#[async_trait]
impl Command for UserNameUpdate {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.name-update"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let user = ctx.require_user()?;
        ctx.security_check(&Action::UserNameUpdate {
            acting: user.actor(),
        })?;

        let real_name = self.real_name.trim();
        if real_name.is_empty() || real_name.chars().count() > REAL_NAME_MAX_CHARS {
            return Err(CommandError::Validation(MessageRef::new(
                "user.name-invalid",
            )));
        }

        if !ctx
            .users()
            .update_real_name(user.principal(), real_name)
            .await?
        {
            return Err(unknown_user());
        }
        Ok(())
    }
}

/// Change the caller's own password after verifying the current one.
#[derive(Clone, Debug)]
pub struct UserPasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[async_trait]
impl Command for UserPasswordChange {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.password-change"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let user = ctx.require_user()?;
        ctx.security_check(&Action::UserPasswordChange {
            acting: user.actor(),
        })?;

        let record = ctx
            .users()
            .find_by_id(user.principal())
            .await?
            .ok_or_else(unknown_user)?;
        if !verify_password(&record.password_hash, &self.current_password)? {
            return Err(CommandError::Password(MessageRef::new("password.mismatch")));
        }
        check_password_format(&ctx.services().config, &self.new_password)?;

        ctx.users()
            .update_password(user.principal(), &hash_password(&self.new_password)?)
            .await?;
        Ok(())
    }
}

/// Read the caller's own profile, delivering (and clearing) any pending
/// one-shot display notice.
#[derive(Clone, Copy, Debug)]
pub struct UserProfileRead;

#[derive(Clone, Debug)]
pub struct ProfileView {
    pub id: Uuid,
    pub email: String,
    pub real_name: String,
    pub status: &'static str,
    pub notice: Option<String>,
}

#[async_trait]
impl Command for UserProfileRead {
    type Response = ProfileView;

    fn name(&self) -> &'static str {
        "user.profile-read"
    }

    async fn run(self, ctx: &mut Context) -> Result<ProfileView, CommandError> {
        let user = ctx.require_user()?;
        ctx.security_check(&Action::UserProfileRead {
            acting: user.actor(),
        })?;

        let record = ctx
            .users()
            .find_by_id(user.principal())
            .await?
            .ok_or_else(unknown_user)?;
        Ok(ProfileView {
            id: record.id,
            email: record.email,
            real_name: record.real_name,
            status: record.status.as_str(),
            notice: user.notice().take(),
        })
    }
}
