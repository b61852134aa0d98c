//! Email relay — the per-chat form that collects an address, then a message.
//!
//! A chat first sends an email address. Once it validates, the next text from
//! the same chat is mailed to that address and the chat starts over.

pub mod controller;
pub mod mailer;
pub mod prompts;
pub mod session;
pub mod validator;

pub use controller::{ChatState, Outcome, Relay};
pub use mailer::{Mailer, SmtpMailer};
pub use session::SessionStore;
pub use validator::is_valid_email;
