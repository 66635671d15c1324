//! Portal feature data: fixture-backed appointments, messages, records and
//! dashboards plus provider-written prescriptions, viewed through a signed-in
//! (or demo) profile.

pub mod fixtures;
pub mod models;
pub mod prescriptions;
pub mod queries;

pub use fixtures::PortalData;
pub use prescriptions::{PrescriptionBook, PrescriptionDraft, Submit};
pub use queries::{Dashboard, Viewer};
