//! Generic command dispatch.
//!
//! `execute` is implemented once and reused by every concrete command: it
//! consults the command's rate gate, runs the business logic against the
//! context's transaction, commits on success, and rolls back on any raised
//! failure. Panics are not caught — an unexpected error is a programming
//! defect and must fail the request hard, not produce a crafted failure.

use crate::identigo::context::Context;
use crate::identigo::failure::{CommandError, CommandFailure};
use crate::identigo::limit::RateLimitOp;
use crate::identigo::messages::MessageRef;
use crate::identigo::storage::IdentityTx;
use async_trait::async_trait;
use tracing::Instrument;

/// A typed request value dispatched through [`execute`].
#[async_trait]
pub trait Command: Send {
    type Response: Send;

    /// Operation tag for logs.
    fn name(&self) -> &'static str;

    /// The admission gate to consult before dispatch, with the principal
    /// scope of the check. `None` for unthrottled operations.
    fn rate_gate(&self) -> Option<(RateLimitOp, String)> {
        None
    }

    /// Business logic; may only raise the closed [`CommandError`] set.
    async fn run(self, ctx: &mut Context) -> Result<Self::Response, CommandError>;
}

/// Run one command to completion: typed response and committed transaction,
/// or structured failure and rolled-back transaction.
pub async fn execute<C: Command>(
    mut ctx: Context,
    command: C,
) -> Result<C::Response, CommandFailure> {
    let span = tracing::info_span!(
        "command",
        command = command.name(),
        request_id = %ctx.request_id(),
        remote_host = %ctx.remote_host(),
    );
    async move {
        if let Some((op, principal)) = command.rate_gate() {
            let gate = ctx.services().gates.gate(op);
            if !gate.is_allowed(ctx.remote_host(), &principal) {
                tracing::info!(op = op.name(), "rate limited");
                let failure = ctx.normalize(CommandError::Validation(MessageRef::with_args(
                    "auth.rate-limited",
                    vec![op.name().to_string()],
                )));
                rollback_quietly(ctx.take_tx()).await;
                return Err(failure);
            }
        }

        match command.run(&mut ctx).await {
            Ok(response) => match ctx.take_tx().commit().await {
                Ok(()) => Ok(response),
                Err(storage) => Err(ctx.normalize(CommandError::Storage(storage))),
            },
            Err(err) => {
                let failure = ctx.normalize(err);
                tracing::debug!(code = %failure.code, status = failure.status, "command failed");
                rollback_quietly(ctx.take_tx()).await;
                Err(failure)
            }
        }
    }
    .instrument(span)
    .await
}

async fn rollback_quietly(tx: Box<dyn IdentityTx>) {
    // The failure already describes the request's fate; a rollback error on
    // top of it is only worth a warning.
    if let Err(err) = tx.rollback().await {
        tracing::warn!(%err, "transaction rollback failed");
    }
}
