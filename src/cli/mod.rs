pub(crate) mod check;
pub(crate) mod command;
pub(crate) mod profile;
pub(crate) mod ui;

pub use self::command::{
    Args, CheckArgs, Command, FakeArgs, LogLevel, OutputFormat, ProfileArgs,
};
