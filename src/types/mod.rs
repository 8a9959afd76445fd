//! Type definitions for the risk evaluation service

pub mod alert;
pub mod page;
pub mod profile;
pub mod transaction;

pub use alert::{FlaggedUserAlert, RiskLevel};
pub use page::{FlaggedQuery, Page, PageRequest, ProfileSortField, SortDirection};
pub use profile::UserRiskProfile;
pub use transaction::{RiskAssessment, Transaction, TransactionRequest, TransactionVerdict};
