use std::borrow::Cow;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::allowlist::SoarArgsAllowList;
use super::scratch::{ScratchError, ScratchFile};
use super::ArgumentMap;

/// Keys whose value is file *content*; it is written to a scratch file and the
/// flag is pointed at that file.
const CONTENT_KEYS: &[&str] = &["blacklist", "query"];

/// Keys the gateway sets itself. Clients may never supply them.
const RESERVED_KEYS: &[&str] = &["log-output"];

const LOG_OUTPUT_FLAG: &str = "-log-output";

/// Default wall-clock limit for a single `soar` invocation.
pub const DEFAULT_SOAR_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SoarError {
    #[error("unable to create temporary file: {0}")]
    TempFileCreate(#[source] io::Error),
    #[error("unable to write temporary file: {0}")]
    TempFileWrite(#[source] io::Error),
    #[error("argument not allowed by soar-gate: {flag} (if soar itself cannot run, no argument is allowed)")]
    DisallowedArgument { flag: String },
    #[error("argument given more than once: {flag}")]
    DuplicateArgument { flag: String },
    #[error("failed to start soar: {0}")]
    Spawn(#[source] io::Error),
    #[error("soar did not finish within {0:?}")]
    Timeout(Duration),
    #[error("soar exited with {status}")]
    Exit {
        status: ExitStatus,
        stdout: Vec<u8>,
        loginfo: Vec<u8>,
    },
    #[error("unable to read soar log output: {source}")]
    LogRead {
        #[source]
        source: io::Error,
        stdout: Vec<u8>,
    },
}

impl From<ScratchError> for SoarError {
    fn from(err: ScratchError) -> Self {
        match err {
            ScratchError::Create(e) => SoarError::TempFileCreate(e),
            ScratchError::Write(e) => SoarError::TempFileWrite(e),
        }
    }
}

impl SoarError {
    /// What the client sees as `stdout` for this failure.
    ///
    /// Process failures carry the binary's own combined output; every other
    /// failure yields its human-readable message.
    pub fn output(&self) -> Cow<'_, [u8]> {
        match self {
            SoarError::Exit { stdout, .. } | SoarError::LogRead { stdout, .. } => {
                Cow::Borrowed(stdout.as_slice())
            }
            other => Cow::Owned(other.to_string().into_bytes()),
        }
    }

    /// What the client sees as `loginfo` for this failure.
    pub fn loginfo(&self) -> Cow<'_, [u8]> {
        match self {
            SoarError::Exit { loginfo, .. } => Cow::Borrowed(loginfo.as_slice()),
            SoarError::LogRead { .. } => Cow::Borrowed(&[]),
            other => Cow::Owned(other.to_string().into_bytes()),
        }
    }

    /// Whether the request was rejected before `soar` was started.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SoarError::DisallowedArgument { .. } | SoarError::DuplicateArgument { .. }
        )
    }
}

/// Output of a successful `soar` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoarOutput {
    /// Combined stdout and stderr of the process.
    pub stdout: Vec<u8>,
    /// Content of the `-log-output` file after the process exited.
    pub loginfo: Vec<u8>,
}

/// An argument list ready to hand to `soar`, together with the scratch files it
/// refers to. Dropping it removes those files.
#[derive(Debug)]
pub struct PreparedArgs {
    args: Vec<String>,
    log: ScratchFile,
    content: Vec<ScratchFile>,
}

impl PreparedArgs {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Paths of every scratch file owned by this argument list.
    pub fn scratch_paths(&self) -> Vec<&Path> {
        self.content
            .iter()
            .map(ScratchFile::path)
            .chain(std::iter::once(self.log.path()))
            .collect()
    }

    fn flag_names(&self) -> Vec<&str> {
        self.args
            .iter()
            .map(|arg| arg.split_once('=').map_or(arg.as_str(), |(flag, _)| flag))
            .collect()
    }
}

/// Runs `soar` with client arguments that passed the allow-list.
#[derive(Debug, Clone)]
pub struct SoarRunner {
    bin: PathBuf,
    allow_list: Arc<SoarArgsAllowList>,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl SoarRunner {
    pub fn new(bin: impl Into<PathBuf>, allow_list: Arc<SoarArgsAllowList>) -> Self {
        Self {
            bin: bin.into(),
            allow_list,
            timeout: DEFAULT_SOAR_TIMEOUT,
            scratch_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Place scratch files in `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn allow_list(&self) -> &SoarArgsAllowList {
        &self.allow_list
    }

    /// Validate `args` against the allow-list and build the `soar` argument list.
    ///
    /// Every key is checked before any scratch file is created, so a rejected
    /// request leaves nothing behind and yields no partial list. Keys that only
    /// differ by surrounding whitespace name the same flag and are rejected.
    pub fn prepare(&self, args: &ArgumentMap) -> Result<PreparedArgs, SoarError> {
        let mut seen = HashSet::with_capacity(args.len());
        for key in args.keys() {
            self.check_key(key)?;
            let key = key.trim();
            if !seen.insert(key) {
                let flag = format!("-{}", key);
                warn!(flag = %flag, "Rejected duplicate soar argument");
                return Err(SoarError::DuplicateArgument { flag });
            }
        }

        let scratch_dir = self.scratch_dir.as_deref();
        let mut tokens = Vec::with_capacity(args.len() + 1);
        let mut content = Vec::new();

        for (key, value) in args {
            let key = key.trim();
            let flag = format!("-{}", key);

            if CONTENT_KEYS.contains(&key) {
                let file = ScratchFile::with_content(scratch_dir, value.as_bytes())?;
                tokens.push(format!("{}={}", flag, file.arg_path()));
                content.push(file);
            } else {
                tokens.push(encode_flag(&flag, value));
            }
        }

        let log = ScratchFile::empty(scratch_dir)?;
        tokens.push(format!("{}={}", LOG_OUTPUT_FLAG, log.arg_path()));

        Ok(PreparedArgs {
            args: tokens,
            log,
            content,
        })
    }

    /// Run `soar` once with the validated `args`.
    ///
    /// The child is killed if the timeout fires or the returned future is
    /// dropped. All scratch files are gone once this returns.
    pub async fn run(&self, args: &ArgumentMap) -> Result<SoarOutput, SoarError> {
        let prepared = self.prepare(args)?;
        debug!(
            bin = %self.bin.display(),
            flags = ?prepared.flag_names(),
            "Running soar"
        );

        let child = Command::new(&self.bin)
            .args(prepared.args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(SoarError::Spawn)?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "soar timed out, child killed");
                return Err(SoarError::Timeout(self.timeout));
            }
        };

        let stdout = combined_output(&output);
        let loginfo = prepared.log.read_back();

        if !output.status.success() {
            warn!(status = %output.status, "soar exited unsuccessfully");
            return Err(SoarError::Exit {
                status: output.status,
                stdout,
                loginfo: loginfo.unwrap_or_default(),
            });
        }

        match loginfo {
            Ok(loginfo) => {
                info!(
                    stdout_bytes = stdout.len(),
                    loginfo_bytes = loginfo.len(),
                    "soar finished"
                );
                Ok(SoarOutput { stdout, loginfo })
            }
            Err(source) => Err(SoarError::LogRead { source, stdout }),
        }
    }

    fn check_key(&self, key: &str) -> Result<(), SoarError> {
        let key = key.trim();
        let flag = format!("-{}", key);

        let allowed = if key.is_empty() || RESERVED_KEYS.contains(&key) {
            false
        } else if CONTENT_KEYS.contains(&key) {
            !self.allow_list.is_denied(&flag)
        } else {
            self.allow_list.is_allowed(&flag)
        };

        if allowed {
            Ok(())
        } else {
            warn!(flag = %flag, "Rejected soar argument");
            Err(SoarError::DisallowedArgument { flag })
        }
    }
}

/// `-flag` for an empty value, `-flag=value` otherwise.
pub fn encode_flag(flag: &str, value: &str) -> String {
    if value.is_empty() {
        flag.to_string()
    } else {
        format!("{}={}", flag, value)
    }
}

/// Stdout followed by stderr, standing in for a single merged stream.
pub(crate) fn combined_output(output: &Output) -> Vec<u8> {
    let mut combined = Vec::with_capacity(output.stdout.len() + output.stderr.len());
    combined.extend_from_slice(&output.stdout);
    combined.extend_from_slice(&output.stderr);
    combined
}
