//! Integration tests for the daemon: protocol round-tripping, and a live
//! server spun up against a temporary app directory to exercise the
//! Unix-socket request/response path end to end.

use findit_daemon::config::Config;
use findit_daemon::{Client, FilterWire, Request, Response, SearchModeWire, Server, SortFieldWire, ToolResult};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn protocol_serde_round_trips_every_request_variant() {
    let cases = vec![
        Request::AddFolder { path: PathBuf::from("/media/vacation") },
        Request::RemoveFolder { path: PathBuf::from("/media/vacation") },
        Request::ListFolders,
        Request::GetLibrarySummary,
        Request::ListVideos { folder: None, status: None, limit: 20, offset: 0 },
        Request::GetVideoDetail { video_id: 42 },
        Request::GetClip { clip_id: 7 },
        Request::Search {
            query: "beach sunset".to_string(),
            mode: Some(SearchModeWire::Auto),
            folder_scope: None,
            limit: Some(10),
            offset: 0,
            filter: Some(FilterWire {
                min_rating: Some(3),
                color_labels: Some(vec!["red".to_string()]),
                shot_types: None,
                moods: None,
            }),
            sort: SortFieldWire::Relevance,
        },
        Request::BrowseAllClips { folder: None, limit: 20, offset: 0, sort: SortFieldWire::Date },
        Request::SetRating { clip_id: 1, rating: 4 },
        Request::SetColorLabel { clip_id: 1, color: "green".to_string() },
        Request::AddTags { clip_id: 1, tags: vec!["family".to_string()] },
        Request::RemoveTags { clip_id: 1, tags: vec!["family".to_string()] },
        Request::GetStats { folder: None },
        Request::Status,
        Request::Shutdown,
    ];

    for request in cases {
        let json = serde_json::to_string(&request).expect("request serializes");
        let _parsed: Request = serde_json::from_str(&json).expect("request round trips");
    }
}

#[test]
fn response_serde_round_trips_each_variant() {
    let response = Response::Result(ToolResult::ok(serde_json::json!({"ok": true})));
    let json = serde_json::to_string(&response).unwrap();
    let parsed: Response = serde_json::from_str(&json).unwrap();
    assert!(matches!(parsed, Response::Result(_)));

    let response = Response::Error("daemon panicked".to_string());
    let json = serde_json::to_string(&response).unwrap();
    let parsed: Response = serde_json::from_str(&json).unwrap();
    match parsed {
        Response::Error(msg) => assert_eq!(msg, "daemon panicked"),
        _ => panic!("expected Error response"),
    }
}

#[test]
fn client_is_daemon_running_false_for_unused_socket() {
    let temp = tempdir().unwrap();
    let fake_socket = temp.path().join("nonexistent.sock");
    let client = Client::new(&fake_socket);
    assert!(!client.is_daemon_running());
    let _client = Client::with_default_socket().with_timeout(Duration::from_secs(10));
}

/// Bring up a real `Server` over a Unix socket in a temp app dir, issue a
/// handful of tool calls through `Client`, and confirm the full IPC round
/// trip behaves per §6 (success payloads, not-found as `is_error=true`
/// rather than a transport error, folder add/remove/list agreement).
#[tokio::test]
async fn server_handles_folder_lifecycle_over_the_socket() {
    let app_dir = tempdir().unwrap();
    let socket_path = app_dir.path().join("daemon.sock");
    let library_dir = tempdir().unwrap();

    let config = Config::default();
    let server = Server::new(&socket_path, app_dir.path(), &config).expect("server binds");

    let server_task = tokio::spawn(async move {
        let _ = server.run().await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = Client::new(&socket_path).with_timeout(Duration::from_secs(5));

    let add_result = client.add_folder(library_dir.path()).expect("add_folder responds");
    assert!(!add_result.is_error, "{:?}", add_result.payload);

    let list_result = client.list_folders().expect("list_folders responds");
    assert!(!list_result.is_error);
    let folders = list_result.payload.as_array().expect("folders is an array");
    assert_eq!(folders.len(), 1);

    let dup_result = client.add_folder(library_dir.path()).expect("duplicate add_folder responds");
    assert!(dup_result.is_error, "re-adding the same folder should surface a tool-level error");

    let missing_clip = client.get_clip(999_999).expect("get_clip responds");
    assert!(missing_clip.is_error);

    let remove_result = client.remove_folder(library_dir.path()).expect("remove_folder responds");
    assert!(!remove_result.is_error);

    let list_after_remove = client.list_folders().expect("list_folders responds again");
    assert_eq!(list_after_remove.payload.as_array().unwrap().len(), 0);

    let status = client.status().expect("status responds");
    assert_eq!(status.folders.len(), 0);

    server_task.abort();
}
