pub mod auth;
pub mod clock;
pub mod lifecycle;
pub mod mailer;
pub mod reaper;

pub use auth::AuthService;
pub use clock::*;
pub use lifecycle::*;
pub use mailer::*;
pub use reaper::Reaper;
