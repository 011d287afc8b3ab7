pub mod download_log;
pub mod file;
pub mod user;

pub use download_log::*;
pub use file::*;
pub use user::*;
