mod bank;
mod command;
mod reboot;
mod status;
mod upload;
mod wipe;

pub use self::bank::BankHandler;
pub use self::command::CommandError;
pub use self::reboot::RebootHandler;
pub use self::status::StatusHandler;
pub use self::upload::{
    UploadError, UploadHandler, UploadReceipt, UploadRequest, UploadSession, UploadState,
    UploadStep,
};
pub use self::wipe::WipeHandler;
