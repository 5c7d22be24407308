use crate::entities::admin_audit_log::{self, Entity as AdminAuditLog};
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set};

/// Append-only access to the admin audit log. No update or delete exists.
pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn append(
        &self,
        action: &str,
        details: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        let active_model = admin_audit_log::ActiveModel {
            action: Set(action.to_string()),
            details: Set(details.map(str::to_string)),
            ip_address: Set(ip_address.map(str::to_string)),
            user_agent: Set(user_agent.map(str::to_string)),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        AdminAuditLog::insert(active_model).exec(&self.conn).await?;
        Ok(())
    }

    /// Newest first.
    pub async fn recent(&self, limit: u64) -> Result<Vec<admin_audit_log::Model>> {
        let items = AdminAuditLog::find()
            .order_by_desc(admin_audit_log::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;
        Ok(items)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(AdminAuditLog::find().count(&self.conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Store;

    #[tokio::test]
    async fn test_append_and_recent_newest_first() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let audit = store.audit_log();

        audit
            .append("LOGIN_SUCCESS", None, Some("10.0.0.1"), None)
            .await
            .unwrap();
        audit
            .append("LOGOUT", Some("Admin #1"), Some("10.0.0.1"), Some("curl/8"))
            .await
            .unwrap();

        let entries = audit.recent(10).await.unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["LOGOUT", "LOGIN_SUCCESS"]);
        assert_eq!(entries[0].user_agent.as_deref(), Some("curl/8"));

        assert_eq!(audit.recent(1).await.unwrap().len(), 1);
        assert_eq!(audit.count().await.unwrap(), 2);
    }
}
