pub mod admin_audit_log;
pub mod admin_credentials;
pub mod appointment_requests;
pub mod password_reset_tokens;
pub mod rate_limit_counters;
pub mod reviews;
