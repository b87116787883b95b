use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSetBuilder};
use regex::RegexBuilder;

use crate::environment::{DirEntry, ExecResult, ExecutionEnvironment, GrepOptions};

/// File extensions grep treats as binary and skips.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "pdf", "zip", "gz", "tar", "bz2", "xz", "7z", "exe",
    "dll", "so", "dylib", "a", "o", "class", "jar", "wasm", "woff", "woff2", "ttf", "otf", "mp3",
    "mp4", "avi", "mov", "bin", "dat", "sqlite",
];

fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Dot-prefixed directory components are skipped during recursive search.
fn is_hidden_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n != "." && n != "..")
        .unwrap_or(false)
}

/// Concrete execution environment rooted at a local working directory.
pub struct LocalExecutionEnvironment {
    working_dir: PathBuf,
    platform: String,
}

impl LocalExecutionEnvironment {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            platform: std::env::consts::OS.to_string(),
        }
    }

    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Resolve a path relative to the working directory if it is not absolute.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Filter environment variables, removing secrets and keeping safe defaults.
    fn filtered_env() -> HashMap<String, String> {
        let exclude_suffixes: &[&str] =
            &["_api_key", "_secret", "_token", "_password", "_credential"];
        let always_include: &[&str] = &["PATH", "HOME", "USER", "SHELL", "LANG", "TERM", "TMPDIR"];

        let mut result = HashMap::new();
        for (key, value) in std::env::vars() {
            let lower = key.to_lowercase();
            if always_include.contains(&key.as_str()) {
                result.insert(key, value);
            } else if !exclude_suffixes.iter().any(|s| lower.ends_with(s)) {
                result.insert(key, value);
            }
        }
        result
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalExecutionEnvironment {
    async fn read_file(&self, path: &Path) -> waypoint_types::Result<String> {
        let resolved = self.resolve(path);
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> waypoint_types::Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(&resolved, content).await?)
    }

    async fn file_exists(&self, path: &Path) -> waypoint_types::Result<bool> {
        let resolved = self.resolve(path);
        Ok(tokio::fs::try_exists(&resolved).await?)
    }

    async fn list_directory(
        &self,
        path: &Path,
        depth: usize,
    ) -> waypoint_types::Result<Vec<DirEntry>> {
        let resolved = self.resolve(path);
        let mut entries = Vec::new();
        list_dir_recursive(&resolved, depth, &mut entries).await?;
        Ok(entries)
    }

    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
        cwd: Option<&Path>,
        env_vars: Option<&HashMap<String, String>>,
    ) -> waypoint_types::Result<ExecResult> {
        let work_dir = cwd
            .map(|p| self.resolve(p))
            .unwrap_or_else(|| self.working_dir.clone());

        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(&work_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .envs(Self::filtered_env());

        // On Unix, use a process group so the whole tree can be killed
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        if let Some(vars) = env_vars {
            cmd.envs(vars);
        }

        let start = tokio::time::Instant::now();
        let mut child = cmd.spawn()?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let timeout_dur = std::time::Duration::from_millis(timeout_ms);

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let mut stdout_buf = Vec::new();
                let mut stderr_buf = Vec::new();
                use tokio::io::AsyncReadExt;
                let _ = stdout.read_to_end(&mut stdout_buf).await;
                let _ = stderr.read_to_end(&mut stderr_buf).await;

                let duration_ms = start.elapsed().as_millis() as u64;
                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                    stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms,
                })
            }
            _ = tokio::time::sleep(timeout_dur) => {
                // Timeout: graceful SIGTERM to the group, then force kill
                #[cfg(unix)]
                {
                    if let Some(pid) = child.id() {
                        unsafe { libc::kill(-(pid as i32), libc::SIGTERM); }
                    }
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {
                            let _ = child.kill().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.kill().await;
                }

                let duration_ms = start.elapsed().as_millis() as u64;
                Ok(ExecResult {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {}ms", timeout_ms),
                    exit_code: -1,
                    timed_out: true,
                    duration_ms,
                })
            }
        }
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &Path,
        options: &GrepOptions,
    ) -> waypoint_types::Result<String> {
        let resolved = self.resolve(path);

        // Try ripgrep first
        if let Ok(output) = try_ripgrep(pattern, &resolved, options).await {
            return Ok(output);
        }

        // Fallback: use the regex crate
        grep_with_regex(pattern, &resolved, options).await
    }

    async fn glob_files(
        &self,
        pattern: &str,
        base: &Path,
    ) -> waypoint_types::Result<Vec<PathBuf>> {
        let resolved = self.resolve(base);
        let glob =
            Glob::new(pattern).map_err(|e| waypoint_types::WaypointError::ToolError {
                tool: "glob".into(),
                message: e.to_string(),
            })?;
        let mut builder = GlobSetBuilder::new();
        builder.add(glob);
        let set = builder
            .build()
            .map_err(|e| waypoint_types::WaypointError::ToolError {
                tool: "glob".into(),
                message: e.to_string(),
            })?;

        let mut matches = Vec::new();
        collect_glob_matches(&resolved, &resolved, &set, &mut matches).await?;
        matches.sort();
        Ok(matches)
    }

    fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    fn platform(&self) -> &str {
        &self.platform
    }
}

/// Recursively list directory entries up to a given depth.
async fn list_dir_recursive(
    path: &Path,
    depth: usize,
    entries: &mut Vec<DirEntry>,
) -> waypoint_types::Result<()> {
    let mut read_dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let meta = entry.metadata().await?;
        let is_dir = meta.is_dir();
        entries.push(DirEntry {
            path: entry.path(),
            is_dir,
            size: meta.len(),
        });
        if is_dir && depth > 1 {
            Box::pin(list_dir_recursive(&entry.path(), depth - 1, entries)).await?;
        }
    }
    Ok(())
}

/// Try running ripgrep as a subprocess.
async fn try_ripgrep(
    pattern: &str,
    path: &Path,
    options: &GrepOptions,
) -> std::result::Result<String, ()> {
    let mut args = vec!["--no-heading".to_string(), "-n".to_string()];
    if options.case_insensitive {
        args.push("-i".to_string());
    }
    if options.context_lines > 0 {
        args.push(format!("-C{}", options.context_lines));
    }
    if let Some(max) = options.max_results {
        args.push(format!("-m{}", max));
    }
    args.push(pattern.to_string());
    args.push(path.to_string_lossy().to_string());

    let output = tokio::process::Command::new("rg")
        .args(&args)
        .output()
        .await
        .map_err(|_| ())?;

    // rg exits 0 on match, 1 on no match, 2 on error
    if output.status.code() == Some(2) {
        return Err(());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Fallback grep using the regex crate (searches files recursively).
async fn grep_with_regex(
    pattern: &str,
    path: &Path,
    options: &GrepOptions,
) -> waypoint_types::Result<String> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.case_insensitive)
        .build()
        .map_err(|e| waypoint_types::WaypointError::ToolError {
            tool: "grep".into(),
            message: e.to_string(),
        })?;

    let mut results = Vec::new();
    let max = options.max_results.unwrap_or(usize::MAX);

    grep_path_recursive(&re, path, options, &mut results, max).await?;
    Ok(results.join("\n"))
}

/// Recursively search files for regex matches as `file:line:text` entries.
/// Binary extensions and dot-prefixed directories are skipped.
async fn grep_path_recursive(
    re: &regex::Regex,
    path: &Path,
    options: &GrepOptions,
    results: &mut Vec<String>,
    max: usize,
) -> waypoint_types::Result<()> {
    if results.len() >= max {
        return Ok(());
    }

    let meta = tokio::fs::metadata(path).await?;
    if meta.is_file() {
        if is_binary_path(path) {
            return Ok(());
        }
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            for (i, line) in content.lines().enumerate() {
                if results.len() >= max {
                    break;
                }
                if re.is_match(line) {
                    results.push(format!("{}:{}:{}", path.display(), i + 1, line));
                }
            }
        }
    } else if meta.is_dir() {
        if is_hidden_dir(path) {
            return Ok(());
        }
        let mut read_dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if results.len() >= max {
                break;
            }
            Box::pin(grep_path_recursive(re, &entry.path(), options, results, max)).await?;
        }
    }
    Ok(())
}

/// Recursively collect files matching a globset.
async fn collect_glob_matches(
    base: &Path,
    current: &Path,
    set: &globset::GlobSet,
    matches: &mut Vec<PathBuf>,
) -> waypoint_types::Result<()> {
    let meta = tokio::fs::metadata(current).await?;
    if meta.is_file() {
        if let Ok(rel) = current.strip_prefix(base) {
            if set.is_match(rel) {
                matches.push(current.to_path_buf());
            }
        }
    } else if meta.is_dir() {
        if is_hidden_dir(current) {
            return Ok(());
        }
        let mut read_dir = tokio::fs::read_dir(current).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            Box::pin(collect_glob_matches(base, &entry.path(), set, matches)).await?;
        }
    }
    Ok(())
}
