//! The PayTrust bills center: login, report navigation and statement export.

pub mod bills;
pub mod login;
pub mod reports;
pub mod selectors;

pub use bills::{BillExporter, BillSource};
pub use login::{login, needs_phone_verification};
pub use reports::{find_report_item, open_all_dates_report};
