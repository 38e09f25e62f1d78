#![deny(clippy::all)]

pub mod config;
pub mod env_store;
pub mod error;
pub mod finder;
mod marker;
mod pid_list;
mod pointer;

pub use config::FinderConfig;
pub use env_store::EnvSnapshot;
pub use env_store::FileLock;
pub use env_store::current_environment;
pub use error::EnvStoreError;
pub use error::FinderError;
pub use finder::Candidate;
pub use finder::NativeFinder;
pub use finder::ProcessFinder;
pub use finder::find_by_marker;
pub use finder::native_finder;
pub use marker::Marker;
pub use pid_list::GROWTH_CHUNK;
pub use pid_list::PidList;
pub use pointer::ByteOrder;
pub use pointer::ForeignPointerWidth;

pub type Pid = libc::pid_t;
