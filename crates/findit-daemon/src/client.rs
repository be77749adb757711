//! Client library for communicating with findit-daemon.
//!
//! Provides a synchronous client for IPC communication with the daemon
//! over Unix sockets, and the PID-file helpers `findit-cli` uses to
//! start/stop/status the daemon process.

use crate::protocol::{DaemonStatus, FilterWire, Request, Response, SearchModeWire, SortFieldWire, ToolResult};
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for client requests (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Time to wait for graceful shutdown before sending SIGKILL (500ms).
const GRACEFUL_SHUTDOWN_WAIT_MS: u64 = 500;

/// Synchronous client for communicating with the daemon. One method per
/// CLI tool call (§6), each returning the [`ToolResult`] envelope
/// unchanged so the CLI decides display/exit-code behavior.
pub struct Client {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Client {
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_default_socket() -> Self {
        Self::new(&crate::server::default_socket_path())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_daemon_running(&self) -> bool {
        if !self.socket_path.exists() {
            return false;
        }
        self.status().is_ok()
    }

    fn send_request(&self, request: &Request) -> Result<Response> {
        let mut stream = UnixStream::connect(&self.socket_path).context("failed to connect to daemon")?;

        stream.set_read_timeout(Some(self.timeout)).context("failed to set read timeout")?;
        stream.set_write_timeout(Some(self.timeout)).context("failed to set write timeout")?;

        let request_json = serde_json::to_string(request)?;
        stream.write_all(request_json.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: Response = serde_json::from_str(&response_line).context("failed to parse daemon response")?;
        Ok(response)
    }

    fn call(&self, request: Request) -> Result<ToolResult> {
        match self.send_request(&request)? {
            Response::Result(result) => Ok(result),
            Response::Status(_) => anyhow::bail!("unexpected status response to a tool call"),
            Response::Error(e) => anyhow::bail!("daemon error: {e}"),
        }
    }

    pub fn add_folder(&self, path: &Path) -> Result<ToolResult> {
        self.call(Request::AddFolder { path: path.to_path_buf() })
    }

    pub fn remove_folder(&self, path: &Path) -> Result<ToolResult> {
        self.call(Request::RemoveFolder { path: path.to_path_buf() })
    }

    pub fn list_folders(&self) -> Result<ToolResult> {
        self.call(Request::ListFolders)
    }

    pub fn get_library_summary(&self) -> Result<ToolResult> {
        self.call(Request::GetLibrarySummary)
    }

    pub fn list_videos(&self, folder: Option<String>, status: Option<String>, limit: usize, offset: usize) -> Result<ToolResult> {
        self.call(Request::ListVideos { folder, status, limit, offset })
    }

    pub fn get_video_detail(&self, video_id: i64) -> Result<ToolResult> {
        self.call(Request::GetVideoDetail { video_id })
    }

    pub fn get_clip(&self, clip_id: i64) -> Result<ToolResult> {
        self.call(Request::GetClip { clip_id })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        query: &str,
        mode: Option<SearchModeWire>,
        folder_scope: Option<Vec<String>>,
        limit: Option<usize>,
        offset: usize,
        filter: Option<FilterWire>,
        sort: SortFieldWire,
    ) -> Result<ToolResult> {
        self.call(Request::Search {
            query: query.to_string(),
            mode,
            folder_scope,
            limit,
            offset,
            filter,
            sort,
        })
    }

    pub fn browse_all_clips(&self, folder: Option<String>, limit: usize, offset: usize, sort: SortFieldWire) -> Result<ToolResult> {
        self.call(Request::BrowseAllClips { folder, limit, offset, sort })
    }

    pub fn set_rating(&self, clip_id: i64, rating: i32) -> Result<ToolResult> {
        self.call(Request::SetRating { clip_id, rating })
    }

    pub fn set_color_label(&self, clip_id: i64, color: &str) -> Result<ToolResult> {
        self.call(Request::SetColorLabel { clip_id, color: color.to_string() })
    }

    pub fn add_tags(&self, clip_id: i64, tags: Vec<String>) -> Result<ToolResult> {
        self.call(Request::AddTags { clip_id, tags })
    }

    pub fn remove_tags(&self, clip_id: i64, tags: Vec<String>) -> Result<ToolResult> {
        self.call(Request::RemoveTags { clip_id, tags })
    }

    pub fn get_stats(&self, folder: Option<String>) -> Result<ToolResult> {
        self.call(Request::GetStats { folder })
    }

    pub fn status(&self) -> Result<DaemonStatus> {
        match self.send_request(&Request::Status)? {
            Response::Status(status) => Ok(status),
            Response::Result(_) => anyhow::bail!("unexpected tool-result response to status"),
            Response::Error(e) => anyhow::bail!("daemon error: {e}"),
        }
    }

    pub fn shutdown(&self) -> Result<()> {
        match self.send_request(&Request::Shutdown)? {
            Response::Result(_) => Ok(()),
            Response::Status(_) => anyhow::bail!("unexpected status response to shutdown"),
            Response::Error(e) => anyhow::bail!("daemon error: {e}"),
        }
    }
}

/// Read the daemon PID from the PID file, treating a stale entry (no
/// live process at that PID) as absent.
pub fn read_daemon_pid(pid_path: &Path) -> Result<Option<u32>> {
    if !pid_path.exists() {
        return Ok(None);
    }

    let pid_str = std::fs::read_to_string(pid_path).context("failed to read PID file")?;
    let pid: u32 = pid_str.trim().parse().context("invalid PID in file")?;

    let is_running = unsafe { libc::kill(pid as i32, 0) } == 0;
    if is_running {
        Ok(Some(pid))
    } else {
        std::fs::remove_file(pid_path).ok();
        Ok(None)
    }
}

/// Send SIGTERM, wait briefly for a graceful exit, then SIGKILL if the
/// process is still alive.
pub fn kill_daemon(pid_path: &Path) -> Result<bool> {
    if let Some(pid) = read_daemon_pid(pid_path)? {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result == 0 {
            std::thread::sleep(Duration::from_millis(GRACEFUL_SHUTDOWN_WAIT_MS));
            if unsafe { libc::kill(pid as i32, 0) } == 0 {
                unsafe { libc::kill(pid as i32, libc::SIGKILL) };
            }
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn read_daemon_pid_nonexistent_file() {
        let path = Path::new("/nonexistent/path/to/pid");
        let result = read_daemon_pid(path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn read_daemon_pid_invalid_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not-a-number").unwrap();
        assert!(read_daemon_pid(file.path()).is_err());
    }

    #[test]
    fn read_daemon_pid_stale_pid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "999999999").unwrap();

        let result = read_daemon_pid(file.path()).unwrap();
        assert!(result.is_none());
        assert!(!file.path().exists());
    }

    #[test]
    fn read_daemon_pid_current_process() {
        let mut file = NamedTempFile::new().unwrap();
        let our_pid = std::process::id();
        writeln!(file, "{our_pid}").unwrap();

        let result = read_daemon_pid(file.path()).unwrap();
        assert_eq!(result, Some(our_pid));
    }

    #[test]
    fn read_daemon_pid_with_whitespace() {
        let mut file = NamedTempFile::new().unwrap();
        let our_pid = std::process::id();
        writeln!(file, "  {our_pid}  ").unwrap();

        let result = read_daemon_pid(file.path()).unwrap();
        assert_eq!(result, Some(our_pid));
    }

    #[test]
    fn kill_daemon_nonexistent_pid_file() {
        let path = Path::new("/nonexistent/path/to/pid");
        assert!(!kill_daemon(path).unwrap());
    }

    #[test]
    fn kill_daemon_stale_pid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "999999999").unwrap();
        assert!(!kill_daemon(file.path()).unwrap());
    }

    #[test]
    fn client_is_daemon_running_nonexistent_socket() {
        let path = Path::new("/tmp/nonexistent-findit-test-socket-xyz123.sock");
        let client = Client::new(path);
        assert!(!client.is_daemon_running());
    }

    #[test]
    fn client_is_daemon_running_checks_socket_exists() {
        let file = NamedTempFile::new().unwrap();
        let client = Client::new(file.path());
        assert!(!client.is_daemon_running());
    }

    #[test]
    fn client_with_timeout_chaining_overrides() {
        let path = Path::new("/tmp/findit-test.sock");
        let _client = Client::new(path).with_timeout(Duration::from_secs(5)).with_timeout(Duration::from_secs(10));
    }

    #[test]
    fn default_timeout_is_30_seconds() {
        assert_eq!(DEFAULT_TIMEOUT_SECS, 30);
    }

    #[test]
    fn graceful_shutdown_wait_is_500ms() {
        assert_eq!(GRACEFUL_SHUTDOWN_WAIT_MS, 500);
    }

    #[test]
    fn read_daemon_pid_empty_file_errors() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();
        assert!(read_daemon_pid(file.path()).is_err());
    }

    #[test]
    fn read_daemon_pid_negative_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "-1").unwrap();
        assert!(read_daemon_pid(file.path()).is_err());
    }
}
