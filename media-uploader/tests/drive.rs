//! Drive folder resolution and uploads against a mock Drive API.

mod common;

use common::{NoConsent, auth_config, cached_token, endpoints, media, options};
use media_uploader::drive_api::{DRIVE_SCOPE, DriveUploader, FOLDER_MIME_TYPE};
use media_uploader::{Error, ValidationError};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::Path;
use tokio_stream::StreamExt;
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FILES: &str = "/drive/v3/files";
const UPLOADS: &str = "/upload/drive/v3/files";

async fn authenticated(dir: &Path, server: &MockServer) -> DriveUploader {
    cached_token(dir, "drive_token.json", DRIVE_SCOPE, false).await;
    let mut uploader = DriveUploader::with_config(
        auth_config(dir, server, DRIVE_SCOPE, "drive_token.json"),
        endpoints(server),
        options(),
    );
    uploader.authenticate_with(&mut NoConsent).await.unwrap();
    uploader
}

fn folder_query(name: &str, parent: &str) -> String {
    format!(
        "name = '{name}' and mimeType = '{FOLDER_MIME_TYPE}' and '{parent}' in parents and trashed = false"
    )
}

async fn mount_search(server: &MockServer, name: &str, parent: &str, files: Value) {
    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param("q", folder_query(name, parent)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
        .mount(server)
        .await;
}

async fn mount_create_folder(server: &MockServer, name: &str, parent: &str, id: &str) {
    Mock::given(method("POST"))
        .and(path(FILES))
        .and(body_partial_json(json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Opens a session for every upload and completes each one in a single chunk.
async fn mount_uploads(server: &MockServer) {
    let session = format!(
        "{}{UPLOADS}?uploadType=resumable&upload_id=drive-session",
        server.uri()
    );
    Mock::given(method("POST"))
        .and(path(UPLOADS))
        .and(query_param("uploadType", "resumable"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", session))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path(UPLOADS))
        .and(query_param("upload_id", "drive-session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "uploaded", "name": "file"})),
        )
        .mount(server)
        .await;
}

/// Names given to `files.create` uploads, in order.
async fn uploaded_names(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == UPLOADS)
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["name"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn missing_folders_are_created() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;

    mount_search(
        &server,
        "Backups",
        "root",
        json!([{"id": "f-backups", "name": "Backups", "mimeType": FOLDER_MIME_TYPE}]),
    )
    .await;
    mount_search(&server, "2024", "f-backups", json!([])).await;
    mount_create_folder(&server, "2024", "f-backups", "f-2024").await;

    let id = uploader
        .find_or_create_folder("Backups/2024/", None)
        .await
        .unwrap();
    assert_eq!(id, "f-2024");
}

#[tokio::test]
async fn quotes_in_folder_names_are_escaped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;

    mount_search(
        &server,
        r"Bob\'s clips",
        "parent-1",
        json!([{"id": "f-bob", "name": "Bob's clips", "mimeType": FOLDER_MIME_TYPE}]),
    )
    .await;

    let id = uploader
        .find_or_create_folder("Bob's clips", Some("parent-1"))
        .await
        .unwrap();
    assert_eq!(id, "f-bob");
}

#[tokio::test]
async fn search_follows_page_tokens() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;

    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"id": "1", "name": "one"}],
            "nextPageToken": "page-2",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"id": "2", "name": "two"}, {"id": "3", "name": "three"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids: Vec<String> = uploader
        .search("name contains 'o'".to_string())
        .map(|file| file.unwrap().id)
        .collect()
        .await;
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn file_is_uploaded_into_folder() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;
    let file = media(dir.path(), "notes.txt", 5000);

    Mock::given(method("POST"))
        .and(path(UPLOADS))
        .and(query_param("uploadType", "resumable"))
        .and(body_partial_json(json!({"name": "notes.txt", "parents": ["f-2024"]})))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}{UPLOADS}?uploadType=resumable&upload_id=s1", server.uri()),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(UPLOADS))
        .and(query_param("upload_id", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "file-1",
            "name": "notes.txt",
            "mimeType": "text/plain",
            "parents": ["f-2024"],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploaded = uploader.upload_file(&file, "f-2024").await.unwrap();
    assert_eq!(uploaded.id, "file-1");
    assert_eq!(uploaded.name, "notes.txt");
    assert_eq!(uploaded.parents, vec!["f-2024".to_string()]);
    assert!(!uploaded.is_folder());
}

#[tokio::test]
async fn folder_tree_is_uploaded_in_name_order() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;

    let src = dir.path().join("trip");
    std::fs::create_dir_all(src.join("day1")).unwrap();
    media(&src, "b.jpg", 10);
    media(&src, "a.jpg", 10);
    media(&src.join("day1"), "c.mp4", 10);

    mount_search(&server, "Photos", "root", json!([])).await;
    mount_create_folder(&server, "Photos", "root", "f-photos").await;
    mount_search(&server, "day1", "f-photos", json!([])).await;
    mount_create_folder(&server, "day1", "f-photos", "f-day1").await;
    mount_uploads(&server).await;

    let folder = uploader.upload(&src, "Photos").await.unwrap();
    assert_eq!(folder, "f-photos");
    assert_eq!(uploaded_names(&server).await, vec!["a.jpg", "b.jpg", "c.mp4"]);

    let parents: Vec<Value> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == UPLOADS)
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap()["parents"].clone())
        .collect();
    assert_eq!(
        parents,
        vec![json!(["f-photos"]), json!(["f-photos"]), json!(["f-day1"])]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_directories_are_not_followed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;

    let src = dir.path().join("trip");
    std::fs::create_dir_all(&src).unwrap();
    media(&src, "a.jpg", 10);
    std::os::unix::fs::symlink(src.join("a.jpg"), src.join("c.jpg")).unwrap();
    std::os::unix::fs::symlink(&src, src.join("loop")).unwrap();

    mount_search(&server, "Photos", "root", json!([])).await;
    mount_create_folder(&server, "Photos", "root", "f-photos").await;
    mount_uploads(&server).await;

    uploader.upload(&src, "Photos").await.unwrap();
    assert_eq!(uploaded_names(&server).await, vec!["a.jpg", "c.jpg"]);
    let folders_created = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == FILES)
        .count();
    assert_eq!(folders_created, 1);
}

#[tokio::test]
async fn neither_file_nor_directory_makes_no_requests() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let uploader = authenticated(dir.path(), &server).await;

    let err = uploader
        .upload(&dir.path().join("nothing-here"), "Backups")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::NotFileOrDirectory(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}
