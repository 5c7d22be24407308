pub mod appointments;
pub use appointments::{AppointmentError, AppointmentService, RequestStatus};

pub mod audit;
pub use audit::{AuditLogger, ClientMeta, actions};

pub mod chat;
pub use chat::{ChatError, ChatReply, ChatService, ReplySource};

pub mod credential_store;
pub use credential_store::{CredentialError, CredentialStore};

pub mod credential_store_impl;
pub use credential_store_impl::SeaOrmCredentialStore;

pub mod email;
pub use email::{
    EmailError, EmailSender, LogEmailSender, MemoryEmailSender, OutgoingEmail, SmtpEmailSender,
};

pub mod gateway;
pub use gateway::{AdminGateway, GatewayError, GatewayRequest, Mutation};

pub mod intake;
pub use intake::{IntakeError, IntakeService, NewPatientForm};

pub mod password_reset;
pub use password_reset::{PasswordResetService, ResetError};

pub mod rate_limit;
pub use rate_limit::{
    CounterStore, DatabaseCounterStore, Decision, MemoryCounterStore, RateLimitError, RateLimiter,
    RatePolicy,
};

pub mod reviews;
pub use reviews::{ModerationDecision, ReviewError, ReviewImageStore, ReviewService};

pub mod sessions;
pub use sessions::{IssuedSession, SessionClaims, SessionError, SessionManager};
