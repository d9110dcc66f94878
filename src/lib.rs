pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod nickname;
pub mod session;
pub mod status;
pub mod store;
pub mod voice;

pub const BOT_NAME: &str = "masquerade";
pub const COMMAND_TARGET: &str = "masquerade::command";
pub const ERROR_TARGET: &str = "masquerade::error";
pub const EVENT_TARGET: &str = "masquerade::handlers";
pub const CONSOLE_TARGET: &str = "masquerade";

pub use data::{Data, DataInner};
pub use error::{NicknameError, NicknameResult};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
