pub mod senders;
pub mod service;

pub use service::{AlertNotifier, NotificationService};
