//! Session identifiers and principal-bound session state.
//!
//! A session identifier is a random URL-safe token with 256 bits of entropy;
//! it is never derived from the principal and is the only key under which a
//! session can be found. Sessions live purely in memory and die with the
//! process.

mod store;

pub use store::SessionStore;

use crate::identigo::policy::{AdminActor, PermissionSet, UserActor};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Opaque session secret identifier.
///
/// `Debug` is redacted so a session token can never leak through logging.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Generate a fresh identifier: 32 random bytes, URL-safe base64.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(Arc::from(
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes),
        ))
    }

    /// Rebuild an identifier from the value a client presented.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        Self(Arc::from(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(..)")
    }
}

/// Single-slot, one-shot display notice ("email added") attached to a session.
#[derive(Debug, Default)]
pub struct NoticeSlot {
    slot: Mutex<Option<String>>,
}

impl NoticeSlot {
    /// Leave a notice; a previous undelivered notice is replaced.
    pub fn leave(&self, notice: String) {
        *self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(notice);
    }

    /// Take the pending notice, leaving the slot empty.
    pub fn take(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

/// Factory/accessor contract every session kind implements; the store is
/// generic over this so user and admin sessions get their own instances.
pub trait PrincipalSession: Send + Sync + 'static {
    /// Session kind tag used for telemetry.
    const KIND: &'static str;

    fn open(id: SessionId, principal: Uuid) -> Self;
    fn id(&self) -> &SessionId;
    fn principal(&self) -> Uuid;
    fn notice(&self) -> &NoticeSlot;
}

/// Session for an authenticated end user.
#[derive(Debug)]
pub struct UserSession {
    id: SessionId,
    user_id: Uuid,
    notice: NoticeSlot,
}

impl UserSession {
    #[must_use]
    pub fn actor(&self) -> UserActor {
        UserActor { id: self.user_id }
    }
}

impl PrincipalSession for UserSession {
    const KIND: &'static str = "user";

    fn open(id: SessionId, principal: Uuid) -> Self {
        Self {
            id,
            user_id: principal,
            notice: NoticeSlot::default(),
        }
    }

    fn id(&self) -> &SessionId {
        &self.id
    }

    fn principal(&self) -> Uuid {
        self.user_id
    }

    fn notice(&self) -> &NoticeSlot {
        &self.notice
    }
}

/// Session for an authenticated administrator, carrying the granted
/// permission set. Grants made while the session is live are visible to
/// later requests on the same session.
#[derive(Debug)]
pub struct AdminSession {
    id: SessionId,
    admin_id: Uuid,
    notice: NoticeSlot,
    permissions: RwLock<PermissionSet>,
}

impl AdminSession {
    #[must_use]
    pub fn permissions(&self) -> PermissionSet {
        *self
            .permissions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_permissions(&self, permissions: PermissionSet) {
        *self
            .permissions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = permissions;
    }

    pub fn grant(&self, permission: PermissionSet) {
        let mut set = self
            .permissions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *set |= permission;
    }

    #[must_use]
    pub fn actor(&self) -> AdminActor {
        AdminActor {
            id: self.admin_id,
            permissions: self.permissions(),
        }
    }
}

impl PrincipalSession for AdminSession {
    const KIND: &'static str = "admin";

    fn open(id: SessionId, principal: Uuid) -> Self {
        Self {
            id,
            admin_id: principal,
            notice: NoticeSlot::default(),
            permissions: RwLock::new(PermissionSet::empty()),
        }
    }

    fn id(&self) -> &SessionId {
        &self.id
    }

    fn principal(&self) -> Uuid {
        self.admin_id
    }

    fn notice(&self) -> &NoticeSlot {
        &self.notice
    }
}
