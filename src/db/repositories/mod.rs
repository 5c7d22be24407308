pub mod appointments;
pub mod audit;
pub mod credentials;
pub mod rate_limits;
pub mod reset_tokens;
pub mod reviews;
