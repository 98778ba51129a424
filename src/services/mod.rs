pub mod auth;
pub mod email;
pub mod password_reset;

pub use auth::AuthService;
pub use email::{EmailService, LogMailer, MailError, Mailer, OutgoingMail};
pub use password_reset::{Clock, PasswordResetService, ResetSettings};

#[cfg(feature = "email")]
pub use email::SmtpMailer;
