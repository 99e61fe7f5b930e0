pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod session;

pub use dispatcher::{Dispatcher, SessionId};
pub use error::SessionError;
pub use session::{Session, SessionState};
