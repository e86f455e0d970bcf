//! Docket table definitions and the versioned migration runner.
//!
//! Every table is SCHEMAFULL. Ids are UUID strings and enum columns are
//! strings checked by ASSERT. `order_history` and `order_activity` deny
//! updates and deletes to record-level users; the repositories only ever
//! CREATE into them.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Orders (aggregate root; never physically deleted)
-- =======================================================================
DEFINE TABLE orders SCHEMAFULL;
DEFINE FIELD reference_number ON TABLE orders TYPE string;
DEFINE FIELD title ON TABLE orders TYPE string;
DEFINE FIELD order_type ON TABLE orders TYPE string;
DEFINE FIELD status ON TABLE orders TYPE string;
DEFINE FIELD priority ON TABLE orders TYPE string;
DEFINE FIELD department_id ON TABLE orders TYPE string;
DEFINE FIELD department_name ON TABLE orders TYPE string;
DEFINE FIELD subject_id ON TABLE orders TYPE option<string>;
DEFINE FIELD subject_name ON TABLE orders TYPE option<string>;
DEFINE FIELD created_by ON TABLE orders TYPE string;
DEFINE FIELD is_public ON TABLE orders TYPE bool DEFAULT false;
DEFINE FIELD expiration_date ON TABLE orders TYPE option<datetime>;
DEFINE FIELD is_archived ON TABLE orders TYPE bool DEFAULT false;
DEFINE FIELD archived_at ON TABLE orders TYPE option<datetime>;
DEFINE FIELD archived_by ON TABLE orders TYPE option<string>;
DEFINE FIELD archive_reason ON TABLE orders TYPE option<string>;
DEFINE FIELD created_at ON TABLE orders TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE orders TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_orders_reference ON TABLE orders \
    COLUMNS reference_number UNIQUE;
DEFINE INDEX idx_orders_owner ON TABLE orders COLUMNS created_by;
DEFINE INDEX idx_orders_expiration ON TABLE orders \
    COLUMNS is_archived, expiration_date;

-- =======================================================================
-- Direct user grants (unique per order + user)
-- =======================================================================
DEFINE TABLE user_grant SCHEMAFULL;
DEFINE FIELD order_id ON TABLE user_grant TYPE string;
DEFINE FIELD user_id ON TABLE user_grant TYPE string;
DEFINE FIELD can_view ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_edit ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_delete ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_share ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_download ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_print ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_comment ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD can_approve ON TABLE user_grant TYPE bool DEFAULT false;
DEFINE FIELD granted_by ON TABLE user_grant TYPE string;
DEFINE FIELD granted_at ON TABLE user_grant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE user_grant TYPE option<datetime>;
DEFINE FIELD notes ON TABLE user_grant TYPE option<string>;
DEFINE INDEX idx_user_grant_order_user ON TABLE user_grant \
    COLUMNS order_id, user_id UNIQUE;

-- =======================================================================
-- Department grants (unique per order + department)
-- =======================================================================
DEFINE TABLE department_grant SCHEMAFULL;
DEFINE FIELD order_id ON TABLE department_grant TYPE string;
DEFINE FIELD department_id ON TABLE department_grant TYPE string;
DEFINE FIELD can_view ON TABLE department_grant TYPE bool DEFAULT false;
DEFINE FIELD can_edit ON TABLE department_grant TYPE bool DEFAULT false;
DEFINE FIELD can_download ON TABLE department_grant TYPE bool \
    DEFAULT false;
DEFINE FIELD can_share ON TABLE department_grant TYPE bool DEFAULT false;
DEFINE FIELD granted_by ON TABLE department_grant TYPE string;
DEFINE FIELD granted_at ON TABLE department_grant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE department_grant TYPE option<datetime>;
DEFINE FIELD notes ON TABLE department_grant TYPE option<string>;
DEFINE INDEX idx_department_grant_order_department \
    ON TABLE department_grant COLUMNS order_id, department_id UNIQUE;

-- =======================================================================
-- User exceptions (unique per order + user)
-- =======================================================================
DEFINE TABLE user_exception SCHEMAFULL;
DEFINE FIELD order_id ON TABLE user_exception TYPE string;
DEFINE FIELD user_id ON TABLE user_exception TYPE string;
DEFINE FIELD created_by ON TABLE user_exception TYPE string;
DEFINE FIELD created_at ON TABLE user_exception TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE user_exception TYPE option<datetime>;
DEFINE FIELD is_active ON TABLE user_exception TYPE bool DEFAULT true;
DEFINE FIELD reason ON TABLE user_exception TYPE option<string>;
DEFINE INDEX idx_user_exception_order_user ON TABLE user_exception \
    COLUMNS order_id, user_id UNIQUE;

-- =======================================================================
-- Order history (append-only)
-- =======================================================================
DEFINE TABLE order_history SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD order_id ON TABLE order_history TYPE string;
DEFINE FIELD action ON TABLE order_history TYPE string \
    ASSERT $value IN ['PermissionGranted', 'PermissionUpdated', \
    'PermissionRevoked', 'DepartmentAccessGranted', \
    'DepartmentAccessUpdated', 'DepartmentAccessRevoked', \
    'ExceptionAdded', 'ExceptionRemoved', 'ExpirationSet', \
    'ExpirationRemoved', 'Archived', 'Restored', 'PermanentlyDeleted'];
DEFINE FIELD old_value ON TABLE order_history TYPE option<string>;
DEFINE FIELD new_value ON TABLE order_history TYPE option<string>;
DEFINE FIELD description ON TABLE order_history TYPE string;
DEFINE FIELD performed_by ON TABLE order_history TYPE string;
DEFINE FIELD performed_at ON TABLE order_history TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD ip_address ON TABLE order_history TYPE option<string>;
DEFINE FIELD user_agent ON TABLE order_history TYPE option<string>;
DEFINE FIELD notes ON TABLE order_history TYPE option<string>;
DEFINE INDEX idx_order_history_order_time ON TABLE order_history \
    COLUMNS order_id, performed_at;

-- =======================================================================
-- Activity log (append-only, request-centric)
-- =======================================================================
DEFINE TABLE order_activity SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD order_id ON TABLE order_activity TYPE option<string>;
DEFINE FIELD actor_id ON TABLE order_activity TYPE string;
DEFINE FIELD controller ON TABLE order_activity TYPE string;
DEFINE FIELD action ON TABLE order_activity TYPE string;
DEFINE FIELD http_method ON TABLE order_activity TYPE string;
DEFINE FIELD path ON TABLE order_activity TYPE string;
DEFINE FIELD is_success ON TABLE order_activity TYPE bool;
DEFINE FIELD status_code ON TABLE order_activity TYPE int;
DEFINE FIELD error_message ON TABLE order_activity TYPE option<string>;
DEFINE FIELD payload ON TABLE order_activity TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD ip_address ON TABLE order_activity TYPE option<string>;
DEFINE FIELD user_agent ON TABLE order_activity TYPE option<string>;
DEFINE FIELD timestamp ON TABLE order_activity TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_order_activity_order_time ON TABLE order_activity \
    COLUMNS order_id, timestamp;
DEFINE INDEX idx_order_activity_actor ON TABLE order_activity \
    COLUMNS actor_id;

-- =======================================================================
-- Archive snapshots (one per archived order)
-- =======================================================================
DEFINE TABLE archived_order SCHEMAFULL;
DEFINE FIELD order_id ON TABLE archived_order TYPE string;
DEFINE FIELD reference_number ON TABLE archived_order TYPE string;
DEFINE FIELD title ON TABLE archived_order TYPE string;
DEFINE FIELD order_type ON TABLE archived_order TYPE string;
DEFINE FIELD status ON TABLE archived_order TYPE string;
DEFINE FIELD priority ON TABLE archived_order TYPE string;
DEFINE FIELD department_id ON TABLE archived_order TYPE string;
DEFINE FIELD department_name ON TABLE archived_order TYPE string;
DEFINE FIELD subject_id ON TABLE archived_order TYPE option<string>;
DEFINE FIELD subject_name ON TABLE archived_order TYPE option<string>;
DEFINE FIELD created_by ON TABLE archived_order TYPE string;
DEFINE FIELD order_created_at ON TABLE archived_order TYPE datetime;
DEFINE FIELD order_updated_at ON TABLE archived_order TYPE datetime;
DEFINE FIELD expiration_date ON TABLE archived_order \
    TYPE option<datetime>;
DEFINE FIELD archived_by ON TABLE archived_order TYPE string;
DEFINE FIELD archived_at ON TABLE archived_order TYPE datetime;
DEFINE FIELD archive_reason ON TABLE archived_order TYPE string;
DEFINE FIELD serialized_order_data ON TABLE archived_order TYPE string;
DEFINE FIELD attachments_info ON TABLE archived_order TYPE string;
DEFINE FIELD payload_digest ON TABLE archived_order TYPE string;
DEFINE FIELD can_be_restored ON TABLE archived_order TYPE bool \
    DEFAULT true;
DEFINE INDEX idx_archived_order_order ON TABLE archived_order \
    COLUMNS order_id UNIQUE;
DEFINE INDEX idx_archived_order_owner ON TABLE archived_order \
    COLUMNS created_by;

-- =======================================================================
-- Directory (reference copy of identity + department facts)
-- =======================================================================
DEFINE TABLE directory_user SCHEMAFULL;
DEFINE FIELD display_name ON TABLE directory_user TYPE string;
DEFINE FIELD is_admin ON TABLE directory_user TYPE bool DEFAULT false;

DEFINE TABLE department SCHEMAFULL;
DEFINE FIELD name ON TABLE department TYPE string;
DEFINE INDEX idx_department_name ON TABLE department COLUMNS name UNIQUE;

-- =======================================================================
-- Attachment metadata (bytes live in the external file store)
-- =======================================================================
DEFINE TABLE attachment SCHEMAFULL;
DEFINE FIELD order_id ON TABLE attachment TYPE string;
DEFINE FIELD file_name ON TABLE attachment TYPE string;
DEFINE FIELD content_type ON TABLE attachment TYPE string;
DEFINE FIELD size_bytes ON TABLE attachment TYPE int;
DEFINE FIELD uploaded_at ON TABLE attachment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_attachment_order ON TABLE attachment COLUMNS order_id;

-- =======================================================================
-- Graph Edge Tables (relations)
-- =======================================================================

-- DirectoryUser -> Department membership
DEFINE TABLE member_of TYPE RELATION SCHEMAFULL;
";

// -----------------------------------------------------------------------
// Runner
// -----------------------------------------------------------------------

/// Bring the Docket tables up to the latest schema version.
///
/// The server runs this from its `migrate` command and every integration
/// test runs it against an in-memory engine before touching a repository.
/// Versions already listed in `_migration` are skipped, so calling it on
/// an up-to-date database only reads the version table.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("cannot create _migration: {e}")))?;

    let applied = applied_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        info!(version = applied, "Docket schema is current");
        return Ok(());
    }

    for migration in pending {
        apply(db, migration).await?;
    }
    Ok(())
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Runs one migration's DDL, then stamps its version. A failed DDL batch
/// leaves no stamp, so the next run retries it.
async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(version = migration.version, name = migration.name, "Migrating Docket schema");

    db.query(migration.sql).await?.check().map_err(|e| {
        DbError::Migration(format!(
            "v{} '{}' failed: {e}",
            migration.version, migration.name
        ))
    })?;

    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| {
            DbError::Migration(format!("v{} applied but not recorded: {e}", migration.version))
        })?;

    info!(version = migration.version, "Docket schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_action_constraint_covers_every_action() {
        for action in docket_core::models::history::HistoryAction::ALL {
            assert!(
                SCHEMA_V1.contains(&format!("'{}'", action.as_str())),
                "order_history.action ASSERT is missing {}",
                action.as_str()
            );
        }
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
