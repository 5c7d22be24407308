pub mod env {

    pub const SECRET_KEY: &str = "CLINIC_SECRET_KEY";

    pub const ADMIN_EMAIL: &str = "ADMIN_EMAIL";

    pub const ADMIN_PASSWORD_HASH: &str = "ADMIN_PASSWORD_HASH";

    pub const SMTP_PASSWORD: &str = "SMTP_PASSWORD";

    pub const CHAT_API_KEY: &str = "CHAT_API_KEY";

    pub const DATABASE_URL: &str = "DATABASE_URL";

    pub const PORT: &str = "PORT";
}

pub mod limits {

    pub const MIN_SECRET_KEY_BYTES: usize = 32;

    pub const MIN_PASSWORD_LENGTH: usize = 8;

    pub const RESET_TOKEN_BYTES: usize = 32;

    pub const RECENT_REQUESTS: u64 = 50;

    pub const AUDIT_PAGE_SIZE: u64 = 100;

    pub const MAX_CHAT_MESSAGE_CHARS: usize = 1000;
}

pub mod headers {

    pub const CSRF_TOKEN: &str = "x-csrf-token";
}

pub mod messages {

    pub const INVALID_CREDENTIALS: &str = "Incorrect email or password.";

    pub const RESET_REQUESTED: &str = "If that email exists, we've sent password reset instructions.";

    pub const INVALID_RESET_LINK: &str = "Invalid or expired reset link. Please request a new one.";

    pub const NOT_AUTHENTICATED: &str = "Not authenticated";
}

pub const REVIEW_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
