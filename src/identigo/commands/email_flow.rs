//! Email verification flows.
//!
//! Adding an address to a live account and activating a freshly created
//! account share the same token shape: a one-shot record whose payload is
//! the address being verified. The raw token travels only inside the mail;
//! storage sees its hash.

use super::{generate_one_shot_token, hash_token, require_valid_email};
use crate::identigo::context::Context;
use crate::identigo::email::EmailMessage;
use crate::identigo::executor::Command;
use crate::identigo::failure::CommandError;
use crate::identigo::limit::RateLimitOp;
use crate::identigo::messages::MessageRef;
use crate::identigo::policy::Action;
use crate::identigo::session::PrincipalSession;
use crate::identigo::storage::{AccountStatus, PendingToken, TokenPurpose};
use async_trait::async_trait;

fn invalid_token() -> CommandError {
    CommandError::Validation(MessageRef::new("token.invalid"))
}

/// Start adding an email address to the caller's account.
#[derive(Clone, Debug)]
pub struct UserEmailAddBegin {
    pub new_email: String,
}

#[async_trait]
impl Command for UserEmailAddBegin {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.email-add-begin"
    }

    fn rate_gate(&self) -> Option<(RateLimitOp, String)> {
        Some((
            RateLimitOp::EmailVerify,
            super::normalize_email(&self.new_email),
        ))
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let user = ctx.require_user()?;
        ctx.security_check(&Action::UserEmailAddBegin {
            acting: user.actor(),
        })?;

        let email = require_valid_email(&self.new_email)?;
        if ctx.users().find_by_email(&email).await?.is_some() {
            return Err(CommandError::Validation(MessageRef::new("user.email-taken")));
        }

        let token = generate_one_shot_token();
        let expires_at = ctx.clock().wall()
            + chrono::Duration::seconds(ctx.services().config.token_ttl_seconds());
        let pending = PendingToken {
            user_id: user.principal(),
            purpose: TokenPurpose::EmailAdd,
            payload: email.clone(),
            expires_at,
        };
        ctx.users().insert_token(&hash_token(&token), &pending).await?;
        ctx.services()
            .mailer
            .send(&EmailMessage::verification(&email, &token))?;

        let notice = ctx.format(&MessageRef::with_args(
            "notice.verification-sent",
            vec![email],
        ));
        user.notice().leave(notice);
        Ok(())
    }
}

/// Confirm an email-add token for the caller's own account.
#[derive(Clone, Debug)]
pub struct UserEmailAddConfirm {
    pub token: String,
}

#[async_trait]
impl Command for UserEmailAddConfirm {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.email-add-confirm"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let user = ctx.require_user()?;
        ctx.security_check(&Action::UserEmailAddConfirm {
            acting: user.actor(),
        })?;

        let now = ctx.clock().wall();
        let consumed = ctx
            .users()
            .consume_token(&hash_token(&self.token), TokenPurpose::EmailAdd, now)
            .await?
            .ok_or_else(invalid_token)?;
        // A token minted for someone else is as good as no token.
        if consumed.user_id != user.principal() {
            return Err(invalid_token());
        }

        ctx.users()
            .update_email(user.principal(), &consumed.payload)
            .await?;
        ctx.users()
            .update_status(user.principal(), AccountStatus::Active)
            .await?;

        let notice = ctx.format(&MessageRef::new("notice.email-added"));
        user.notice().leave(notice);
        Ok(())
    }
}

/// Deny an email-add token ("this wasn't me"); consumes it.
#[derive(Clone, Debug)]
pub struct UserEmailAddDeny {
    pub token: String,
}

#[async_trait]
impl Command for UserEmailAddDeny {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.email-add-deny"
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let user = ctx.require_user()?;
        ctx.security_check(&Action::UserEmailAddDeny {
            acting: user.actor(),
        })?;

        let now = ctx.clock().wall();
        let consumed = ctx
            .users()
            .consume_token(&hash_token(&self.token), TokenPurpose::EmailAdd, now)
            .await?
            .ok_or_else(invalid_token)?;
        if consumed.user_id != user.principal() {
            return Err(invalid_token());
        }

        let notice = ctx.format(&MessageRef::new("notice.email-denied"));
        user.notice().leave(notice);
        Ok(())
    }
}

/// Activate a freshly created account with the mailed token. Runs without
/// a session; possession of the token is the authorization.
#[derive(Clone, Debug)]
pub struct UserAccountVerify {
    pub token: String,
}

#[async_trait]
impl Command for UserAccountVerify {
    type Response = ();

    fn name(&self) -> &'static str {
        "user.account-verify"
    }

    fn rate_gate(&self) -> Option<(RateLimitOp, String)> {
        // Host-scoped: blunts token guessing from one source.
        Some((RateLimitOp::EmailVerify, String::new()))
    }

    async fn run(self, ctx: &mut Context) -> Result<(), CommandError> {
        let now = ctx.clock().wall();
        let consumed = ctx
            .users()
            .consume_token(&hash_token(&self.token), TokenPurpose::EmailAdd, now)
            .await?
            .ok_or_else(invalid_token)?;

        ctx.users()
            .update_email(consumed.user_id, &consumed.payload)
            .await?;
        if !ctx
            .users()
            .update_status(consumed.user_id, AccountStatus::Active)
            .await?
        {
            return Err(invalid_token());
        }
        tracing::info!(user_id = %consumed.user_id, "account verified");
        Ok(())
    }
}
