use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_ENVIRON_CAP: usize = 4048;
pub const DEFAULT_PS_PROGRAM: &str = "ps";

#[derive(Debug, Clone)]
pub struct FinderConfig {
    pub proc_root: PathBuf,
    pub environ_cap: usize,
    pub ps_program: OsString,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl FinderConfig {
    pub fn from_env() -> Self {
        Self {
            proc_root: env::var_os("NATIVEEXEC_PROC_ROOT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT)),
            environ_cap: env::var("NATIVEEXEC_ENVIRON_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|cap: &usize| *cap > 0)
                .unwrap_or(DEFAULT_ENVIRON_CAP),
            ps_program: env::var_os("NATIVEEXEC_PS")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| OsString::from(DEFAULT_PS_PROGRAM)),
        }
    }

    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn with_environ_cap(mut self, cap: usize) -> Self {
        self.environ_cap = cap;
        self
    }

    pub fn with_ps_program(mut self, program: impl Into<OsString>) -> Self {
        self.ps_program = program.into();
        self
    }
}
