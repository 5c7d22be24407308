use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, sea_query::Expr,
};
use serde::Serialize;

use crate::entities::appointment_requests;

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentRequest {
    pub id: i32,
    pub name: String,
    pub contact: String,
    pub preferred_times: String,
    pub service: String,
    pub note: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<appointment_requests::Model> for AppointmentRequest {
    fn from(model: appointment_requests::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            contact: model.contact,
            preferred_times: model.preferred_times,
            service: model.service,
            note: model.note,
            status: model.status,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAppointmentRequest {
    pub name: String,
    pub contact: String,
    pub preferred_times: String,
    pub service: String,
    pub note: Option<String>,
}

pub struct AppointmentRepository {
    conn: DatabaseConnection,
}

impl AppointmentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, request: &NewAppointmentRequest) -> Result<AppointmentRequest> {
        let active = appointment_requests::ActiveModel {
            name: Set(request.name.clone()),
            contact: Set(request.contact.clone()),
            preferred_times: Set(request.preferred_times.clone()),
            service: Set(request.service.clone()),
            note: Set(request.note.clone()),
            status: Set("new".to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert appointment request")?;

        Ok(model.into())
    }

    pub async fn get(&self, id: i32) -> Result<Option<AppointmentRequest>> {
        let row = appointment_requests::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query appointment request")?;

        Ok(row.map(AppointmentRequest::from))
    }

    /// Newest first.
    pub async fn list_recent(&self, limit: u64) -> Result<Vec<AppointmentRequest>> {
        let rows = appointment_requests::Entity::find()
            .order_by_desc(appointment_requests::Column::CreatedAt)
            .order_by_desc(appointment_requests::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list appointment requests")?;

        Ok(rows.into_iter().map(AppointmentRequest::from).collect())
    }

    pub async fn set_status(&self, id: i32, status: &str) -> Result<bool> {
        let result = appointment_requests::Entity::update_many()
            .col_expr(
                appointment_requests::Column::Status,
                Expr::value(status.to_string()),
            )
            .filter(appointment_requests::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update appointment status")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = appointment_requests::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete appointment request")?;

        Ok(result.rows_affected > 0)
    }
}
