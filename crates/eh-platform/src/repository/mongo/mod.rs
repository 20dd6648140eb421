//! MongoDB repositories

pub mod user;
pub mod event;
pub mod notification;
pub mod message;
pub mod report;
pub mod indexes;

pub use user::MongoUserRepository;
pub use event::MongoEventRepository;
pub use notification::MongoNotificationRepository;
pub use message::MongoMessageRepository;
pub use report::MongoReportRepository;
pub use indexes::ensure_indexes;

use mongodb::error::{Error, ErrorKind, WriteFailure};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// The write failed on a unique index; returns the server message
pub(crate) fn duplicate_key_message(err: &Error) -> Option<&str> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE => {
            Some(e.message.as_str())
        }
        _ => None,
    }
}
