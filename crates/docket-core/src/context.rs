//! Per-request caller context.

use uuid::Uuid;

/// Identity and client metadata of the caller, passed explicitly into
/// every service operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor_id: Uuid,
    /// Whether the identity provider reports the caller in the Admin role.
    pub is_admin: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn user(actor_id: Uuid) -> Self {
        Self {
            actor_id,
            is_admin: false,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn admin(actor_id: Uuid) -> Self {
        Self {
            is_admin: true,
            ..Self::user(actor_id)
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}
