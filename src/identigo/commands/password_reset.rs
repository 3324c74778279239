//! Password reset flow.
//!
//! Begin is unauthenticated and outwardly always succeeds so the endpoint
//! cannot be used to probe for accounts; the mail only goes out when the
//! address is known. Complete trades the mailed one-shot token for a new
//! password.

use super::{
    check_password_format, generate_one_shot_token, hash_password, hash_token, normalize_email,
    require_valid_email,
};
use crate::identigo::context::Context;
use crate::identigo::email::EmailMessage;
use crate::identigo::executor::Command;
use crate::identigo::failure::CommandError;
use crate::identigo::limit::RateLimitOp;
use crate::identigo::messages::MessageRef;
use crate::identigo::storage::{PendingToken, TokenPurpose};
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct UserPasswordResetBegin {
    pub email: String,
}

#[async_trait]
impl Command for UserPasswordResetBegin {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.password-reset-begin"
    }

    fn rate_gate(&self) -> Option<(RateLimitOp, String)> {
        Some((RateLimitOp::PasswordReset, normalize_email(&self.email)))
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let email = require_valid_email(&self.email)?;

        let Some(user) = ctx.users().find_by_email(&email).await? else {
            // Unknown address: same outward outcome, no mail.
            return Ok(());
        };

        let token = generate_one_shot_token();
        let expires_at = ctx.clock().wall()
            + chrono::Duration::seconds(ctx.services().config.token_ttl_seconds());
        let pending = PendingToken {
            user_id: user.id,
            purpose: TokenPurpose::PasswordReset,
            payload: String::new(),
            expires_at,
        };
        ctx.users().insert_token(&hash_token(&token), &pending).await?;
        ctx.services()
            .mailer
            .send(&EmailMessage::password_reset(&email, &token))?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct UserPasswordResetComplete {
    pub token: String,
    pub new_password: String,
}

#[async_trait]
impl Command for UserPasswordResetComplete {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.password-reset-complete"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        check_password_format(&ctx.services().config, &self.new_password)?;

        let now = ctx.clock().wall();
        let consumed = ctx
            .users()
            .consume_token(&hash_token(&self.token), TokenPurpose::PasswordReset, now)
            .await?
            .ok_or_else(|| CommandError::Validation(MessageRef::new("token.invalid")))?;

        ctx.users()
            .update_password(consumed.user_id, &hash_password(&self.new_password)?)
            .await?;
        tracing::info!(user_id = %consumed.user_id, "password reset completed");
        Ok(())
    }
}
