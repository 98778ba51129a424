pub mod health;
pub mod login;
pub mod password_reset;
pub mod register;

pub use health::health_check;
pub use login::login;
pub use password_reset::{request_password_reset, reset_password, verify_reset_token};
pub use register::register;
