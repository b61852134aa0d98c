//! User-facing texts.

/// Reply to `/start`.
pub const WELCOME: &str = "Welcome! Please enter your email:";

/// Reply when an address is accepted and the chat now waits for a message.
pub const EMAIL_ACCEPTED: &str = "Email confirmed. Now enter the message text:";

pub const EMAIL_INVALID: &str = "Invalid email. Please try again:";

pub const SEND_SUCCESS: &str = "Message sent successfully!";

/// Generic notice; the underlying error only goes to the log.
pub const SEND_FAILURE: &str = "Failed to send the message.";

/// Subject line of every relayed email.
pub const MAIL_SUBJECT: &str = "Message from Telegram bot";

/// The command that (re)shows the welcome prompt.
pub const START_COMMAND: &str = "/start";
