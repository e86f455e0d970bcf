//! Capability sets and the resolved permission decision.

use serde::{Deserialize, Serialize};

/// The eight fixed actions a user grant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub view: bool,
    pub edit: bool,
    pub delete: bool,
    pub share: bool,
    pub download: bool,
    pub print: bool,
    pub comment: bool,
    pub approve: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        view: true,
        edit: true,
        delete: true,
        share: true,
        download: true,
        print: true,
        comment: true,
        approve: true,
    };

    pub fn none() -> Self {
        Self::default()
    }

    pub fn view_only() -> Self {
        Self {
            view: true,
            ..Self::default()
        }
    }

    /// True when no flag is set (a no-op grant).
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            view: self.view || other.view,
            edit: self.edit || other.edit,
            delete: self.delete || other.delete,
            share: self.share || other.share,
            download: self.download || other.download,
            print: self.print || other.print,
            comment: self.comment || other.comment,
            approve: self.approve || other.approve,
        }
    }
}

/// Department grants are coarser: no delete, print, comment or approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepartmentCapabilities {
    pub view: bool,
    pub edit: bool,
    pub download: bool,
    pub share: bool,
}

impl DepartmentCapabilities {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            view: self.view || other.view,
            edit: self.edit || other.edit,
            download: self.download || other.download,
            share: self.share || other.share,
        }
    }
}

impl From<DepartmentCapabilities> for Capabilities {
    fn from(caps: DepartmentCapabilities) -> Self {
        Self {
            view: caps.view,
            edit: caps.edit,
            download: caps.download,
            share: caps.share,
            ..Self::default()
        }
    }
}

/// Point-in-time capability decision for a (user, order) pair.
///
/// Computed fresh on every check and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub is_owner: bool,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_share: bool,
    pub can_download: bool,
    pub can_print: bool,
    pub can_comment: bool,
    pub can_approve: bool,
}

impl EffectivePermissions {
    pub fn owner() -> Self {
        Self {
            is_owner: true,
            ..Self::from(Capabilities::ALL)
        }
    }

    pub fn denied() -> Self {
        Self::default()
    }

    /// Admin role grants every capability; `is_owner` is left untouched.
    pub fn with_admin_override(self, is_admin: bool) -> Self {
        if is_admin {
            Self {
                is_owner: self.is_owner,
                ..Self::from(Capabilities::ALL)
            }
        } else {
            self
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            view: self.can_view,
            edit: self.can_edit,
            delete: self.can_delete,
            share: self.can_share,
            download: self.can_download,
            print: self.can_print,
            comment: self.can_comment,
            approve: self.can_approve,
        }
    }
}

impl From<Capabilities> for EffectivePermissions {
    fn from(caps: Capabilities) -> Self {
        Self {
            is_owner: false,
            can_view: caps.view,
            can_edit: caps.edit,
            can_delete: caps.delete,
            can_share: caps.share,
            can_download: caps.download,
            can_print: caps.print,
            can_comment: caps.comment,
            can_approve: caps.approve,
        }
    }
}
