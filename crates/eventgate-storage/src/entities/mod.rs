pub mod attendees;
pub mod deployments;
pub mod events;
pub mod usage_logs;

pub use attendees::Entity as Attendees;
pub use deployments::Entity as Deployments;
pub use events::Entity as Events;
pub use usage_logs::Entity as UsageLogs;
