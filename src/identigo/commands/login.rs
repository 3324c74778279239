//! Login and logout for both principal kinds.
//!
//! Failed logins are indistinguishable from the outside: unknown account,
//! unverified account, and wrong password all produce the same generic
//! validation error so the endpoint cannot be used to probe for accounts.

use super::{normalize_email, valid_email, verify_password};
use crate::identigo::context::{Context, SessionHandle};
use crate::identigo::executor::Command;
use crate::identigo::failure::CommandError;
use crate::identigo::limit::RateLimitOp;
use crate::identigo::messages::MessageRef;
use crate::identigo::session::PrincipalSession;
use crate::identigo::storage::AccountStatus;
use async_trait::async_trait;
use uuid::Uuid;

fn invalid_credentials() -> CommandError {
    CommandError::Validation(MessageRef::new("auth.invalid-credentials"))
}

#[derive(Clone, Debug)]
pub struct UserLogin {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct UserLoginResponse {
    pub session_token: String,
    pub user_id: Uuid,
    pub real_name: String,
}

#[async_trait]
impl Command for UserLogin {
    type Response = UserLoginResponse;

    fn name(&self) -> &'static str {
        "user.login"
    }

    fn rate_gate(&self) -> Option<(RateLimitOp, String)> {
        Some((RateLimitOp::Login, normalize_email(&self.email)))
    }

    async fn run(self, ctx: &mut Context) -> Result<UserLoginResponse, CommandError> {
        let email = normalize_email(&self.email);
        if !valid_email(&email) {
            return Err(invalid_credentials());
        }

        let Some(user) = ctx.users().find_by_email(&email).await? else {
            return Err(invalid_credentials());
        };
        if user.status != AccountStatus::Active {
            return Err(invalid_credentials());
        }
        if !verify_password(&user.password_hash, &self.password)? {
            return Err(invalid_credentials());
        }

        let session = ctx.services().user_sessions.create(user.id);
        tracing::info!(user_id = %user.id, "user login");
        Ok(UserLoginResponse {
            session_token: session.id().as_str().to_string(),
            user_id: user.id,
            real_name: user.real_name,
        })
    }
}

#[derive(Clone, Debug)]
pub struct AdminLogin {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AdminLoginResponse {
    pub session_token: String,
    pub admin_id: Uuid,
    pub real_name: String,
}

#[async_trait]
impl Command for AdminLogin {
    type Response = AdminLoginResponse;

    fn name(&self) -> &'static str {
        "admin.login"
    }

    fn rate_gate(&self) -> Option<(RateLimitOp, String)> {
        Some((RateLimitOp::Login, normalize_email(&self.email)))
    }

    async fn run(self, ctx: &mut Context) -> Result<AdminLoginResponse, CommandError> {
        let email = normalize_email(&self.email);
        if !valid_email(&email) {
            return Err(invalid_credentials());
        }

        let Some(admin) = ctx.admins().find_by_email(&email).await? else {
            return Err(invalid_credentials());
        };
        if !verify_password(&admin.password_hash, &self.password)? {
            return Err(invalid_credentials());
        }

        let session = ctx.services().admin_sessions.create(admin.id);
        session.set_permissions(admin.permissions);
        tracing::info!(admin_id = %admin.id, "admin login");
        Ok(AdminLoginResponse {
            session_token: session.id().as_str().to_string(),
            admin_id: admin.id,
            real_name: admin.real_name,
        })
    }
}

/// Logout; idempotent — a missing or already-dead session is not an error.
#[derive(Clone, Copy, Debug)]
pub struct UserLogout;

#[async_trait]
impl Command for UserLogout {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.logout"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        if let SessionHandle::User(session) = ctx.session() {
            let id = session.id().clone();
            ctx.services().user_sessions.delete(&id);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdminLogout;

#[async_trait]
impl Command for AdminLogout {
    type Response = ();

    fn name(&self) -> &'static str {
        "admin.logout"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        if let SessionHandle::Admin(session) = ctx.session() {
            let id = session.id().clone();
            ctx.services().admin_sessions.delete(&id);
        }
        Ok(())
    }
}
