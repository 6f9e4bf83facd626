//! # vigil_notify
//!
//! Notification fan-out for policy violations:
//! - **`NotificationChannel`**: async trait implemented per transport
//! - **`NotificationDispatcher`**: best-effort routing by channel name;
//!   delivery failures are logged, never surfaced to gate evaluation
//! - **`LogChannel`**: tracing-backed default sink

pub mod channel;
pub mod dispatcher;
pub mod error;

pub use channel::{LogChannel, Notification, NotificationChannel};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use error::{NotifyError, NotifyResult};
