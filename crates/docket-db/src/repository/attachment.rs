//! SurrealDB store of attachment metadata.

use chrono::{DateTime, Utc};
use docket_core::error::DocketResult;
use docket_core::models::attachment::{AttachmentInfo, CreateAttachment};
use docket_core::repository::AttachmentRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AttachmentRow {
    record_id: String,
    order_id: String,
    file_name: String,
    content_type: String,
    size_bytes: u64,
    uploaded_at: DateTime<Utc>,
}

impl AttachmentRow {
    fn try_into_attachment(self) -> Result<AttachmentInfo, DbError> {
        Ok(AttachmentInfo {
            id: parse_uuid("attachment", &self.record_id)?,
            order_id: parse_uuid("attachment", &self.order_id)?,
            file_name: self.file_name,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            uploaded_at: self.uploaded_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAttachmentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAttachmentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateAttachment) -> DocketResult<AttachmentInfo> {
        let id = Uuid::new_v4();

        let mut result = self
            .db
            .query(
                "CREATE type::record('attachment', $id) SET \
                 order_id = $order_id, file_name = $file_name, \
                 content_type = $content_type, size_bytes = $size_bytes; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('attachment', $id);",
            )
            .bind(("id", id.to_string()))
            .bind(("order_id", input.order_id.to_string()))
            .bind(("file_name", input.file_name))
            .bind(("content_type", input.content_type))
            .bind(("size_bytes", input.size_bytes))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AttachmentRow> = result.take(1).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("attachment insert returned no record".into()))?;

        row.try_into_attachment().map_err(Into::into)
    }
}

impl<C: Connection> AttachmentRepository for SurrealAttachmentRepository<C> {
    async fn list_for_order(&self, order_id: Uuid) -> DocketResult<Vec<AttachmentInfo>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM attachment \
                 WHERE order_id = $order_id ORDER BY uploaded_at ASC",
            )
            .bind(("order_id", order_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AttachmentRow> = result.take(0).map_err(DbError::from)?;
        let attachments = rows
            .into_iter()
            .map(AttachmentRow::try_into_attachment)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(attachments)
    }
}
