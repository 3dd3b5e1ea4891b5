pub mod evaluation_service;
pub mod scheduler;
pub mod settings;

pub use evaluation_service::{EvaluationError, EvaluationService};
pub use scheduler::AlertScheduler;
pub use settings::AlertSettings;
