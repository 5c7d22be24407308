//! Appointment requests submitted from the public contact form.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{AppointmentRequest, NewAppointmentRequest, Store};
use crate::services::email::{EmailSender, appointment_notification_email, send_with_timeout};

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment request not found: {0}")]
    NotFound(i32),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    New,
    Contacted,
    Approved,
    Closed,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Approved => "approved",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "approved" => Ok(Self::Approved),
            "closed" => Ok(Self::Closed),
            other => Err(AppointmentError::Validation(format!(
                "Unknown status '{other}'"
            ))),
        }
    }
}

pub struct AppointmentService {
    store: Store,
    mailer: Arc<dyn EmailSender>,
    /// Where new-request notifications go. `None` disables them.
    notify_to: Option<String>,
    clinic_name: String,
    mail_timeout: Duration,
}

impl AppointmentService {
    #[must_use]
    pub fn new(
        store: Store,
        mailer: Arc<dyn EmailSender>,
        notify_to: Option<String>,
        clinic_name: String,
        mail_timeout: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            notify_to,
            clinic_name,
            mail_timeout,
        }
    }

    pub async fn submit(
        &self,
        request: NewAppointmentRequest,
    ) -> Result<AppointmentRequest, AppointmentError> {
        let request = NewAppointmentRequest {
            name: request.name.trim().to_string(),
            contact: request.contact.trim().to_string(),
            preferred_times: request.preferred_times.trim().to_string(),
            service: request.service.trim().to_string(),
            note: request
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };

        if request.name.is_empty()
            || request.contact.is_empty()
            || request.preferred_times.is_empty()
            || request.service.is_empty()
        {
            return Err(AppointmentError::Validation(
                "Please fill all required fields.".to_string(),
            ));
        }

        let saved = self.store.appointments().insert(&request).await?;
        tracing::info!(id = saved.id, "Appointment request received");

        if let Some(to) = &self.notify_to {
            let message = appointment_notification_email(to, &self.clinic_name, &saved);
            let mailer = Arc::clone(&self.mailer);
            let limit = self.mail_timeout;
            tokio::spawn(async move {
                if let Err(e) = send_with_timeout(mailer.as_ref(), &message, limit).await {
                    tracing::warn!(error = %e, "Failed to send appointment notification");
                }
            });
        }

        Ok(saved)
    }

    pub async fn list_recent(&self, limit: u64) -> Result<Vec<AppointmentRequest>, AppointmentError> {
        Ok(self.store.appointments().list_recent(limit).await?)
    }

    pub async fn set_status(
        &self,
        id: i32,
        status: RequestStatus,
    ) -> Result<(), AppointmentError> {
        if self
            .store
            .appointments()
            .set_status(id, status.as_str())
            .await?
        {
            Ok(())
        } else {
            Err(AppointmentError::NotFound(id))
        }
    }

    /// Deletes the request and returns it as it was.
    pub async fn delete(&self, id: i32) -> Result<AppointmentRequest, AppointmentError> {
        let repo = self.store.appointments();
        let existing = repo.get(id).await?.ok_or(AppointmentError::NotFound(id))?;

        if !repo.delete(id).await? {
            return Err(AppointmentError::NotFound(id));
        }
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::MemoryEmailSender;

    fn form(name: &str) -> NewAppointmentRequest {
        NewAppointmentRequest {
            name: name.to_string(),
            contact: "555-0100".to_string(),
            preferred_times: "Weekday mornings".to_string(),
            service: "Cleaning".to_string(),
            note: Some("  ".to_string()),
        }
    }

    async fn setup(notify: Option<&str>) -> (AppointmentService, Arc<MemoryEmailSender>) {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let mailer = Arc::new(MemoryEmailSender::new());
        let service = AppointmentService::new(
            store,
            mailer.clone(),
            notify.map(str::to_string),
            "Clinic".to_string(),
            Duration::from_secs(1),
        );
        (service, mailer)
    }

    #[tokio::test]
    async fn test_submit_trims_and_defaults() {
        let (service, _) = setup(None).await;
        let saved = service.submit(form("  Jane Doe ")).await.unwrap();

        assert_eq!(saved.name, "Jane Doe");
        assert_eq!(saved.status, "new");
        assert!(saved.note.is_none());
    }

    #[tokio::test]
    async fn test_submit_requires_fields() {
        let (service, _) = setup(None).await;
        let result = service.submit(form("   ")).await;
        assert!(matches!(result, Err(AppointmentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let (service, _) = setup(None).await;
        let saved = service.submit(form("Jane")).await.unwrap();

        service.set_status(saved.id, RequestStatus::Contacted).await.unwrap();
        let listed = service.list_recent(50).await.unwrap();
        assert_eq!(listed[0].status, "contacted");

        assert!(matches!(
            service.set_status(999, RequestStatus::Closed).await,
            Err(AppointmentError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, _) = setup(None).await;
        let saved = service.submit(form("Jane")).await.unwrap();

        let deleted = service.delete(saved.id).await.unwrap();
        assert_eq!(deleted.name, "Jane");
        assert!(service.list_recent(50).await.unwrap().is_empty());
        assert!(matches!(
            service.delete(saved.id).await,
            Err(AppointmentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_notifies_admin() {
        let (service, mailer) = setup(Some("admin@clinic.test")).await;
        service.submit(form("Jane")).await.unwrap();

        for _ in 0..50 {
            if !mailer.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "admin@clinic.test");
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Contacted".parse::<RequestStatus>().unwrap(), RequestStatus::Contacted);
        assert!("archived".parse::<RequestStatus>().is_err());
    }
}
