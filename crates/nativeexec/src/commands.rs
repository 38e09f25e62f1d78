//! Command-line definitions for the nativeexec tools.
//!
//! Each binary is a single-purpose tool with its own argument struct; the
//! argument shapes are a stable protocol the IDE drives.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

const PROCESS_START_ABOUT: &str = r#"Run a command on an existing pseudo-terminal.

The command becomes a session leader with PTY as its controlling terminal and
as its stdin, stdout and stderr. Its pid is written to stdout as the first
line before the command starts.

EXIT STATUS:
    The command's own exit status on a normal exit
    127  the command could not be executed
    71   the terminal could not be set up
    1    the command was killed by a signal

EXAMPLES:
    process_start -p /dev/pts/4 make all
    process_start -p /dev/pts/4 -q -e /tmp/env.dump -- ./a.out --verbose"#;

#[derive(Debug, Parser)]
#[command(name = "process_start", version)]
#[command(about = "Run a command on an existing pseudo-terminal")]
#[command(long_about = PROCESS_START_ABOUT)]
pub struct ProcessStartArgs {
    /// Terminal device the command runs on
    #[arg(short = 'p', value_name = "PTY")]
    pub pty: PathBuf,

    /// Send a break to the terminal after the command exits
    #[arg(short = 'q')]
    pub send_break: bool,

    /// Environment dump to use instead of the inherited environment
    #[arg(short = 'e', value_name = "DUMP")]
    pub env_dump: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<OsString>,
}

#[derive(Debug, Parser)]
#[command(name = "pfind", version)]
#[command(about = "List processes whose environment contains a marker entry")]
pub struct PfindArgs {
    /// Print a JSON object instead of one pid per line
    #[arg(long)]
    pub json: bool,

    /// Environment entry to look for, usually NAME=value
    #[arg(value_name = "MARKER")]
    pub marker: OsString,
}

#[derive(Debug, Parser)]
#[command(name = "privp", version)]
#[command(about = "Grant additional privileges to a running process through su")]
pub struct PrivpArgs {
    /// User to authenticate as
    pub user: String,

    /// Privilege set added to the inheritable set, e.g. proc_owner,proc_session
    pub privileges: String,

    /// Target process
    pub pid: u32,

    #[arg(long, env = "NATIVEEXEC_SU", default_value = "su", hide = true)]
    pub su_program: OsString,
}

#[derive(Debug, Parser)]
#[command(name = "sigqueue", version)]
#[command(about = "Queue a signal with an integer payload")]
pub struct SigqueueArgs {
    #[arg(allow_negative_numbers = true)]
    pub pid: i32,

    pub signo: i32,

    /// Payload delivered in si_value
    #[arg(allow_negative_numbers = true)]
    pub value: i32,
}

#[derive(Debug, Parser)]
#[command(name = "stat", version)]
#[command(about = "Print the inode number and change time of a file")]
pub struct StatArgs {
    pub filename: PathBuf,
}
