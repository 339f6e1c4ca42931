use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use super::runner::{combined_output, SoarError};

/// A flag line in `soar --help`: leading whitespace, then a dash-prefixed token.
/// `\s` also matches newlines, so a column-zero token right after a blank line
/// counts as a flag too.
static HELP_FLAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s+(-\S*)").unwrap());

/// Flags `soar` accepts from clients, keyed by normalized name (`-flag`).
///
/// `true` means permitted, `false` means explicitly denied. Names that are not
/// present at all are rejected the same way as denied ones.
#[derive(Debug, Clone, Default)]
pub struct SoarArgsAllowList {
    flags: HashMap<String, bool>,
}

impl SoarArgsAllowList {
    /// Build an allow-list from the text printed by `soar --help`.
    ///
    /// Every token matching a flag line is registered as allowed.
    pub fn from_help_text(help: &str) -> Self {
        let flags = HELP_FLAG_RE
            .captures_iter(help)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|flag| flag.len() > 1)
            .map(|flag| (flag.to_string(), true))
            .collect();

        Self { flags }
    }

    /// Run `<bin> --help` and parse its combined output.
    ///
    /// The exit status is ignored since Go's flag package reports `--help` as a
    /// usage error on some versions. Failing to spawn the binary at all is an error.
    pub async fn discover(bin: &Path, timeout: Duration) -> Result<Self, SoarError> {
        debug!(bin = %bin.display(), "Discovering soar flags");

        let child = Command::new(bin)
            .arg("--help")
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| SoarError::Timeout(timeout))?
            .map_err(SoarError::Spawn)?;

        let help = String::from_utf8_lossy(&combined_output(&output)).into_owned();
        let list = Self::from_help_text(&help);

        info!(bin = %bin.display(), flags = list.len(), "Discovered soar flags");
        Ok(list)
    }

    /// Mark every deny-listed flag as disallowed.
    ///
    /// Names are trimmed and given a leading dash if they lack one. A name that
    /// `soar --help` never mentioned is still recorded as denied, so the map
    /// reflects the full configured deny-list.
    pub fn apply_deny_list<S: AsRef<str>>(&mut self, deny: &[S]) {
        for name in deny {
            let flag = normalize_flag(name.as_ref());
            if flag.len() <= 1 {
                continue;
            }
            match self.flags.insert(flag.clone(), false) {
                Some(_) => debug!(flag = %flag, "Denied soar flag"),
                None => debug!(flag = %flag, "Denied soar flag not offered by soar --help"),
            }
        }
    }

    /// Builder-style variant of [`apply_deny_list`](Self::apply_deny_list).
    pub fn with_deny_list<S: AsRef<str>>(mut self, deny: &[S]) -> Self {
        self.apply_deny_list(deny);
        self
    }

    /// Whether `flag` (already normalized, e.g. `-report`) is permitted.
    pub fn is_allowed(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }

    /// Whether `flag` is present and explicitly denied.
    pub fn is_denied(&self, flag: &str) -> bool {
        self.flags.get(flag) == Some(&false)
    }

    /// Number of known flags, permitted or denied.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Permitted flags, sorted.
    pub fn allowed_flags(&self) -> Vec<&str> {
        let mut flags: Vec<&str> = self
            .flags
            .iter()
            .filter(|(_, allowed)| **allowed)
            .map(|(flag, _)| flag.as_str())
            .collect();
        flags.sort_unstable();
        flags
    }
}

impl<S: Into<String>> FromIterator<S> for SoarArgsAllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let flags = iter
            .into_iter()
            .map(|flag| (normalize_flag(&flag.into()), true))
            .collect();
        Self { flags }
    }
}

/// Trim `name` and make sure it carries a single leading dash.
pub fn normalize_flag(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('-') {
        name.to_string()
    } else {
        format!("-{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELP: &str = "\
Usage of soar:
  -allow-charsets string
    \tAllowCharsets (default \"utf8,utf8mb4\")
  -blacklist string
    \t指定 blacklist 配置文件的位置
  -config string
    \tConfig file path
  -log-output string
    \tLogOutput, 日志输出位置 (default \"soar.log\")
  -query string
    \t待评审的 SQL 或 SQL 文件
  -report-type string
    \tReportType (default \"markdown\")
  -test-dsn string
    \tTestDSN
  -verbose
    \tVerbose
";

    #[test]
    fn test_parses_help_flags() {
        let list = SoarArgsAllowList::from_help_text(HELP);
        assert_eq!(
            list.allowed_flags(),
            vec![
                "-allow-charsets",
                "-blacklist",
                "-config",
                "-log-output",
                "-query",
                "-report-type",
                "-test-dsn",
                "-verbose",
            ]
        );
    }

    #[test]
    fn test_ignores_description_lines() {
        let list = SoarArgsAllowList::from_help_text(HELP);
        assert!(!list.is_allowed("Usage"));
        assert!(!list.is_allowed("-"));
        assert!(!list.is_allowed("AllowCharsets"));
    }

    #[test]
    fn test_flag_at_column_zero_needs_preceding_whitespace() {
        let list = SoarArgsAllowList::from_help_text("-not-indented\n  -indented\n");
        assert!(!list.is_allowed("-not-indented"));
        assert!(list.is_allowed("-indented"));

        let list = SoarArgsAllowList::from_help_text("Usage:\n\n-col-zero\n  -indented\n");
        assert!(list.is_allowed("-col-zero"));
        assert!(list.is_allowed("-indented"));
    }

    #[test]
    fn test_deny_list_flips_existing_flags() {
        let list = SoarArgsAllowList::from_help_text(HELP).with_deny_list(&["-config", "test-dsn"]);
        assert!(!list.is_allowed("-config"));
        assert!(list.is_denied("-config"));
        assert!(!list.is_allowed("-test-dsn"));
        assert!(list.is_allowed("-verbose"));
    }

    #[test]
    fn test_deny_list_records_unknown_flags() {
        let list = SoarArgsAllowList::from_help_text(HELP).with_deny_list(&["-not-a-soar-flag", "  "]);
        assert!(list.is_denied("-not-a-soar-flag"));
        assert!(!list.is_allowed("-not-a-soar-flag"));
        assert_eq!(list.allowed_flags().len(), 8);
    }

    #[test]
    fn test_from_iter_normalizes() {
        let list: SoarArgsAllowList = ["report", " -verbose "].into_iter().collect();
        assert!(list.is_allowed("-report"));
        assert!(list.is_allowed("-verbose"));
    }

    #[test]
    fn test_normalize_flag() {
        assert_eq!(normalize_flag("query"), "-query");
        assert_eq!(normalize_flag(" -query "), "-query");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_discover_reads_stderr_and_ignores_exit_status() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("soar");
        std::fs::write(
            &bin,
            "#!/bin/sh\necho 'Usage of soar:' >&2\necho '  -verbose' >&2\necho '  -query string' >&2\nexit 2\n",
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let list = SoarArgsAllowList::discover(&bin, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(list.is_allowed("-verbose"));
        assert!(list.is_allowed("-query"));
    }

    #[tokio::test]
    async fn test_discover_missing_binary_fails() {
        let result = SoarArgsAllowList::discover(
            Path::new("/nonexistent/soar-binary"),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(SoarError::Spawn(_))));
    }
}
