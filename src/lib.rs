//! Mail Relay — Telegram chats in, one email per message out.

pub mod channels;
pub mod config;
pub mod error;
pub mod relay;
