//! Administrator permissions.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Permissions grantable to an administrator.
    ///
    /// Mutating permissions imply the matching read: an admin allowed to
    /// create, update, or delete users can always read them. `expand`
    /// applies that closure; authorization always checks the expanded set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PermissionSet: u32 {
        const USER_CREATE = 1 << 0;
        const USER_READ = 1 << 1;
        const USER_UPDATE = 1 << 2;
        const USER_DELETE = 1 << 3;
        const AUDIT_READ = 1 << 4;
        const PERMISSION_GRANT = 1 << 5;
    }
}

impl PermissionSet {
    /// Closure over implied permissions.
    #[must_use]
    pub fn expand(self) -> Self {
        let mut expanded = self;
        if self.intersects(Self::USER_CREATE | Self::USER_UPDATE | Self::USER_DELETE) {
            expanded |= Self::USER_READ;
        }
        expanded
    }

    /// Parse a single permission by its canonical name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_name(name.trim().to_ascii_uppercase().as_str())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}
