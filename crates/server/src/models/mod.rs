//! Domain models shared by the repositories, services and routes.

pub mod complaint;
pub mod settings;
pub mod user;

pub use complaint::{
    Complaint, ComplaintFilter, ComplaintPage, ComplaintQuery, ComplaintStats, NewComplaint,
    Pagination, SortField, SortOrder, StatusChange, Submitter,
};
pub use settings::{MASKED_SECRET, NotificationPreferences, SystemSettings, SystemSettingsView};
pub use user::{NewUser, Principal, User};
