#![deny(clippy::all)]

pub mod error;
mod forward;
mod launcher;
mod pty_pair;
mod relay;

pub use error::LaunchError;
pub use forward::SignalForwarder;
pub use launcher::ChildExit;
pub use launcher::LaunchRequest;
pub use launcher::LaunchedChild;
pub use launcher::format_pid_line;
pub use launcher::launch;
pub use launcher::resolve_program;
pub use launcher::send_break;
pub use pty_pair::PtyPair;
pub use relay::PasswordRelay;

pub type Result<T> = std::result::Result<T, LaunchError>;
