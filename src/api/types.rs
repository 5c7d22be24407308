use serde::{Deserialize, Serialize};

use crate::db::{AppointmentRequest, AuditEntry, Review};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminDto {
    pub id: i32,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct SessionDto {
    pub admin: AdminDto,
    pub csrf_token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub id: i32,
    pub name: String,
    pub contact: String,
    pub preferred_times: String,
    pub service: String,
    pub note: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<AppointmentRequest> for AppointmentDto {
    fn from(r: AppointmentRequest) -> Self {
        Self {
            id: r.id,
            name: r.name,
            contact: r.contact,
            preferred_times: r.preferred_times,
            service: r.service,
            note: r.note,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewDto {
    pub id: i32,
    pub author: String,
    pub body: String,
    pub rating: i32,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderated_at: Option<String>,
}

impl From<Review> for ReviewDto {
    fn from(r: Review) -> Self {
        Self {
            id: r.id,
            author: r.author,
            body: r.body,
            rating: r.rating,
            status: r.status,
            created_at: r.created_at,
            moderated_at: r.moderated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryDto {
    pub id: i64,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl From<AuditEntry> for AuditEntryDto {
    fn from(e: AuditEntry) -> Self {
        Self {
            id: e.id,
            action: e.action,
            details: e.details,
            ip_address: e.ip_address,
            user_agent: e.user_agent,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: String,
    pub uptime: u64,
    pub database: bool,
}
