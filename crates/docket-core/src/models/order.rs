//! Order domain model: the protected, lifecycle-managed resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference_number: String,
    pub title: String,
    pub order_type: String,
    pub status: String,
    pub priority: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub subject_id: Option<Uuid>,
    pub subject_name: Option<String>,
    /// Owner of the order.
    pub created_by: Uuid,
    pub is_public: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub is_archived: bool,
    /// Set iff `is_archived`.
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<Uuid>,
    pub archive_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.created_by == user_id
    }

    /// Whether the expiration date has been reached at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|date| date <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub reference_number: String,
    pub title: String,
    pub order_type: String,
    pub status: String,
    pub priority: String,
    pub department_id: Uuid,
    pub department_name: String,
    pub subject_id: Option<Uuid>,
    pub subject_name: Option<String>,
    pub created_by: Uuid,
    pub is_public: bool,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(expiration_date: Option<DateTime<Utc>>) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            reference_number: "ORD-1".into(),
            title: "Procurement".into(),
            order_type: "Internal".into(),
            status: "Open".into(),
            priority: "Normal".into(),
            department_id: Uuid::new_v4(),
            department_name: "Finance".into(),
            subject_id: None,
            subject_name: None,
            created_by: Uuid::new_v4(),
            is_public: false,
            expiration_date,
            is_archived: false,
            archived_at: None,
            archived_by: None,
            archive_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expiration_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(order(Some(now)).is_expired_at(now));
        assert!(!order(Some(now + Duration::seconds(1))).is_expired_at(now));
        assert!(!order(None).is_expired_at(now));
    }
}
