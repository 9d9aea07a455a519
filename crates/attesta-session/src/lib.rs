pub mod error;
pub mod session;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use session::Session;
pub use store::{SessionHandle, SessionStore};
