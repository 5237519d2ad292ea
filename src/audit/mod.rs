//! Session audit trail.
//!
//! One [`AuditLog`] is created per session. It records runner actions and
//! step output as plain-text records in
//! `<log_dir>/<actor>_<unix seconds>_session.log`.

pub mod log;
pub mod record;

pub use log::AuditLog;
pub use record::{AuditRecord, RecordKind};
