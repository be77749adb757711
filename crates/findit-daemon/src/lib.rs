//! findit-daemon: library for the FindIt background daemon.
//!
//! This crate provides:
//! - Unix socket server for IPC (§6 tool surface)
//! - Client library for communicating with the daemon
//! - Protocol types for client-daemon communication
//! - File system watcher for incremental indexing (§4.7)
//! - The folder registry and shared query/storage handles (`library`)

pub mod client;
pub mod config;
pub mod library;
pub mod protocol;
pub mod server;
pub mod throttle;
pub mod watcher;

pub use client::{kill_daemon, read_daemon_pid, Client};
pub use library::{FolderEntry, FolderSummary, Library, LibrarySummary};
pub use protocol::{
    DaemonStatus, FilterWire, FolderStatusWire, Request, Response, SearchModeWire, SortFieldWire, ToolResult,
};
pub use server::{default_app_dir, default_pid_path, default_socket_path, Server};
pub use throttle::Throttler;
pub use watcher::{FileEvent, FileEventKind, FileWatcher};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_reexports_are_callable() {
        let _client: Client = Client::with_default_socket();
        let pid_path = default_pid_path();
        let _result: anyhow::Result<bool> = kill_daemon(&pid_path);
        let _result = read_daemon_pid(&pid_path);
    }

    #[test]
    fn protocol_reexports_construct() {
        let _req = Request::Status;
        let _req2 = Request::Shutdown;
        let _resp = Response::Result(ToolResult::ok(serde_json::json!({})));
        let _resp2 = Response::Error("test".to_string());

        let status = DaemonStatus {
            uptime_secs: 100,
            folders: vec![FolderStatusWire {
                path: "/lib".to_string(),
                video_count: 1,
                completed_count: 1,
                failed_count: 0,
                is_watching: true,
            }],
            throttle_state: "idle".to_string(),
        };
        assert_eq!(status.uptime_secs, 100);
        assert!(status.folders[0].is_watching);
    }

    #[test]
    fn server_reexports_present() {
        let _ = std::any::type_name::<Server>();
        let socket_path = default_socket_path();
        let pid_path = default_pid_path();
        let app_dir = default_app_dir();
        assert!(!socket_path.as_os_str().is_empty());
        assert!(!pid_path.as_os_str().is_empty());
        assert!(!app_dir.as_os_str().is_empty());
    }

    #[test]
    fn throttle_reexports_present() {
        let throttler = Throttler::new();
        let _idle = throttler.idle_duration();
        let limits = throttler.get_limits();
        assert!(limits.batch_size >= 1);
        assert!(!throttler.state_description().is_empty());
    }

    #[test]
    fn watcher_reexports_present() {
        let event = FileEvent {
            path: std::path::PathBuf::from("/test/clip.mp4"),
            kind: FileEventKind::Modified,
        };
        assert_eq!(event.path, std::path::PathBuf::from("/test/clip.mp4"));
        assert!(matches!(event.kind, FileEventKind::Modified));
        let _ = std::any::type_name::<FileWatcher>();
    }
}
