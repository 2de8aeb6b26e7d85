//! Error taxonomy for tatami, split by the layer that produces each error:
//! `MainError` for startup/CLI, `ConfigError` for the Lua config parse,
//! `X11Error` for the Xlib draw surface, and `WmError` for the running
//! window manager. Every variant carries enough context to log a useful
//! message; the x11rb error types convert in via `#[from]`.

use thiserror::Error;

/// Top-level error returned from `main`.
#[derive(Debug, Error)]
pub enum MainError {
    #[error("no program name in argv")]
    NoProgramName,

    #[error("invalid arguments")]
    InvalidArguments,

    #[error("could not determine a config directory")]
    NoConfigDir,

    #[error("could not start the window manager: {0}")]
    CouldNotStartWm(WmError),

    #[error("window manager error: {0}")]
    WmError(WmError),

    #[error("failed to re-exec on restart: {0}")]
    RestartFailed(std::io::Error),

    #[error("failed to read the built-in config template: {0}")]
    FailedReadConfigTemplate(ConfigError),
}

/// Errors produced while parsing the Lua configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config must return a table")]
    NotATable,

    #[error("no tags configured")]
    NoTags,

    #[error("too many tags: {0} bits requested, at most 31 are available")]
    TooManyTags(usize),

    #[error("unknown key name: {0}")]
    UnknownKey(String),

    #[error("unknown layout: {0}")]
    UnknownLayout(String),

    #[error("unknown modifier: {0}")]
    UnknownModifier(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown click context: {0}")]
    UnknownClickContext(String),

    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),
}

/// Errors from the Xlib/Xft draw surface.
#[derive(Debug, Error)]
pub enum X11Error {
    #[error("failed to open the X display")]
    DisplayOpenFailed,

    #[error("failed to load font: {0}")]
    FontLoadFailed(String),

    #[error("failed to create the Xft draw surface")]
    DrawCreateFailed,

    #[error(transparent)]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error(transparent)]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error(transparent)]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),
}

/// Errors from the running window manager.
#[derive(Debug, Error)]
pub enum WmError {
    #[error("another window manager is already running")]
    AnotherWmRunning,

    #[error("fatal protocol error: {0}")]
    FatalProtocolError(String),

    #[error(transparent)]
    X11(#[from] X11Error),

    #[error(transparent)]
    Connect(#[from] x11rb::errors::ConnectError),

    #[error(transparent)]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error(transparent)]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error(transparent)]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),
}
