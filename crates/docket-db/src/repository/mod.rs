//! SurrealDB repository implementations.
//!
//! Mutations that must be audited run as one SurrealQL transaction that
//! also creates the `order_history` row (see [`history::HISTORY_INSERT`]).

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Bind the `$h_*` parameters used by [`history::HISTORY_INSERT`].
macro_rules! bind_history {
    ($builder:expr, $params:expr) => {{
        let params: $crate::repository::history::HistoryParams = $params;
        $builder
            .bind(("h_id", params.id))
            .bind(("h_order_id", params.order_id))
            .bind(("h_action", params.action))
            .bind(("h_old_value", params.old_value))
            .bind(("h_new_value", params.new_value))
            .bind(("h_description", params.description))
            .bind(("h_performed_by", params.performed_by))
            .bind(("h_ip_address", params.ip_address))
            .bind(("h_user_agent", params.user_agent))
            .bind(("h_notes", params.notes))
    }};
}

mod activity;
mod archive;
mod attachment;
mod department_grant;
mod directory;
mod history;
mod order;
mod user_exception;
mod user_grant;

pub use activity::SurrealActivityLogRepository;
pub use archive::SurrealArchiveRepository;
pub use attachment::SurrealAttachmentRepository;
pub use department_grant::SurrealDepartmentGrantRepository;
pub use directory::SurrealDirectoryRepository;
pub use history::SurrealHistoryRepository;
pub use order::SurrealOrderRepository;
pub use user_exception::SurrealUserExceptionRepository;
pub use user_grant::SurrealUserGrantRepository;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Wrap statements in a single SurrealQL transaction.
pub(crate) fn transaction(statements: &str) -> String {
    format!("BEGIN TRANSACTION;\n{statements}\nCOMMIT TRANSACTION;")
}

/// Thrown by [`require_rows`] guards; classified as [`DbError::NotFound`].
pub(crate) const MISSING_ROW: &str = "docket:missing-row";

/// Thrown by guards that find a row which must not exist yet; classified
/// as [`DbError::Conflict`].
pub(crate) const DUPLICATE_ROW: &str = "docket:duplicate-row";

/// Thrown when an archive's captured grants no longer match the live
/// rows; classified as [`DbError::Stale`].
pub(crate) const STALE_GRANTS: &str = "docket:stale-grants";

/// Guard statement that cancels the enclosing transaction when `select`
/// returns no rows. Must come before the writes it protects.
pub(crate) fn require_rows(select: &str) -> String {
    format!("IF array::len(({select})) = 0 {{ THROW \"{MISSING_ROW}\" }};")
}

pub(crate) fn parse_uuid(entity: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::corrupt(entity, format!("invalid UUID {raw}: {e}")))
}

pub(crate) fn parse_opt_uuid(entity: &str, raw: Option<String>) -> Result<Option<Uuid>, DbError> {
    raw.map(|s| parse_uuid(entity, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_throws_marker_on_empty_select() {
        let guard = require_rows("SELECT VALUE id FROM user_grant WHERE order_id = $order_id");
        assert!(guard.starts_with("IF array::len((SELECT VALUE id FROM user_grant"));
        assert!(guard.contains(&format!("THROW \"{MISSING_ROW}\"")));
    }
}
