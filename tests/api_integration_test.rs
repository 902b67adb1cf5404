use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use file_share_backend::config::AppConfig;
use file_share_backend::entities::{prelude::*, *};
use file_share_backend::infrastructure::database::run_migrations;
use file_share_backend::services::storage::LocalStorageService;
use file_share_backend::{AppState, create_app};
use http_body_util::BodyExt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

struct TestApp {
    app: Router,
    db: DatabaseConnection,
    files_dir: TempDir,
}

async fn setup_app() -> TestApp {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1);
    let db = Database::connect(opt).await.unwrap();
    run_migrations(&db, "sqlite::memory:").await.unwrap();

    let files_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorageService::new(files_dir.path()));
    storage.init().await.unwrap();

    let state = AppState {
        db: db.clone(),
        storage,
        config: AppConfig::development(),
    };

    TestApp {
        app: create_app(state),
        db,
        files_dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(uri: &str, token: &str, files: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (filename, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            {content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let credentials = format!(r#"{{"username": "{}", "password": "password123"}}"#, username);

    let (status, _) = send(app, json_request("POST", "/register", None, &credentials)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send_json(app, json_request("POST", "/login", None, &credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["token_type"], "bearer");
    json["token"].as_str().unwrap().to_string()
}

async fn upload(app: &Router, token: &str, files: &[(&str, &str)]) -> Value {
    let (status, json) = send_json(app, multipart_request("/upload", token, files)).await;
    assert_eq!(status, StatusCode::OK);
    json
}

async fn expire_share(db: &DatabaseConnection, public_id: &str) {
    let share = Shares::find()
        .filter(shares::Column::PublicId.eq(public_id))
        .one(db)
        .await
        .unwrap()
        .unwrap();
    let mut active: shares::ActiveModel = share.into();
    active.expires_at = Set(Some(Utc::now() - Duration::minutes(1)));
    active.update(db).await.unwrap();
}

fn stored_blob_count(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

#[tokio::test]
async fn test_upload_and_public_download_flow() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "alice").await;

    // 1. Upload two files into a new share
    let share = upload(
        &t.app,
        &token,
        &[("notes.txt", "first file"), ("data.csv", "a,b\n1,2")],
    )
    .await;
    let public_id = share["public_id"].as_str().unwrap().to_string();

    assert_eq!(share["files"].as_array().unwrap().len(), 2);
    assert_eq!(share["password_protected"], false);
    assert_eq!(share["is_shared"], true);
    assert!(share["expires_at"].is_string());
    assert_eq!(
        share["share_link"],
        format!("http://localhost:3000/download/{}", public_id)
    );
    assert_eq!(stored_blob_count(&t.files_dir), 2);

    // 2. Recipient sees the share with download tokens
    let (status, status_json) =
        send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_json["locked"], false);
    let files = status_json["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);

    let notes = files.iter().find(|f| f["filename"] == "notes.txt").unwrap();
    let download_token = notes["token"].as_str().unwrap();

    // 3. Download through the token, no login required
    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/public/file/{}", download_token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    assert!(
        response.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"notes.txt\"")
    );
    let content = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(String::from_utf8_lossy(&content), "first file");

    // 4. Owner listing
    let (status, list) = send_json(&t.app, get("/shares", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["public_id"], public_id.as_str());
    assert_eq!(list[0]["file_count"], 2);
}

#[tokio::test]
async fn test_password_protected_share() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "bob").await;
    let share = upload(&t.app, &token, &[("secret.txt", "top secret")]).await;
    let public_id = share["public_id"].as_str().unwrap();

    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            &format!("/share/{}", public_id),
            Some(&token),
            r#"{"password": "hunter2"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Locked shares list no files
    let (status, json) = send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["locked"], true);
    assert!(json["files"].as_array().unwrap().is_empty());

    // Wrong password
    let unlock_uri = format!("/public/share/{}/unlock", public_id);
    let (status, json) = send_json(
        &t.app,
        json_request("POST", &unlock_uri, None, r#"{"password": "wrong"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Incorrect password");

    // Right password
    let (status, json) = send_json(
        &t.app,
        json_request("POST", &unlock_uri, None, r#"{"password": "hunter2"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["locked"], false);
    let download_token = json["files"][0]["token"].as_str().unwrap();

    let (status, body) = send(&t.app, get(&format!("/public/file/{}", download_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"top secret");

    // Empty password removes the lock
    send(
        &t.app,
        json_request(
            "POST",
            &format!("/share/{}", public_id),
            Some(&token),
            r#"{"password": ""}"#,
        ),
    )
    .await;
    let (_, json) = send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(json["locked"], false);
}

#[tokio::test]
async fn test_expired_share_is_gone() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "carol").await;
    let share = upload(&t.app, &token, &[("old.txt", "old")]).await;
    let public_id = share["public_id"].as_str().unwrap();

    // Grab a download token while the share is still live
    let (_, json) = send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    let download_token = json["files"][0]["token"].as_str().unwrap().to_string();

    expire_share(&t.db, public_id).await;

    let (status, json) = send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(json["error"], "Link expired");

    let (status, _) = send(&t.app, get(&format!("/public/file/{}", download_token), None)).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_share_settings() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "dave").await;
    let share = upload(&t.app, &token, &[("a.txt", "a")]).await;
    let public_id = share["public_id"].as_str().unwrap();
    let uri = format!("/share/{}", public_id);

    for body in [
        r#"{"expires_minutes": 0}"#,
        r#"{"expires_minutes": 1441}"#,
        r#"{"expires_minutes": 10, "clear_expiration": true}"#,
    ] {
        let (status, _) = send(&t.app, json_request("POST", &uri, Some(&token), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
    }

    // Never expire
    let (status, _) = send(
        &t.app,
        json_request("POST", &uri, Some(&token), r#"{"clear_expiration": true}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send_json(&t.app, get(&uri, Some(&token))).await;
    assert!(json["expires_at"].is_null());

    // Hidden shares are not found publicly but still visible to the owner
    let (status, _) = send(
        &t.app,
        json_request("POST", &uri, Some(&token), r#"{"is_shared": false}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, json) = send_json(&t.app, get(&uri, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_shared"], false);
}

#[tokio::test]
async fn test_owner_deletes_files_and_share() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "erin").await;
    let share = upload(&t.app, &token, &[("one.txt", "1"), ("two.txt", "2")]).await;
    let public_id = share["public_id"].as_str().unwrap();

    // Add a third file to the share
    let (status, json) = send_json(
        &t.app,
        multipart_request(
            &format!("/share/{}/files", public_id),
            &token,
            &[("three.txt", "3")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["files"].as_array().unwrap().len(), 3);
    assert_eq!(stored_blob_count(&t.files_dir), 3);

    // Delete a single file
    let file_id = json["files"][0]["id"].as_i64().unwrap();
    let (status, _) = send(
        &t.app,
        delete(&format!("/share/{}/file/{}", public_id, file_id), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored_blob_count(&t.files_dir), 2);

    let (_, json) = send_json(&t.app, get(&format!("/share/{}", public_id), Some(&token))).await;
    assert_eq!(json["files"].as_array().unwrap().len(), 2);

    // Delete the whole share
    let (status, _) = send(&t.app, delete(&format!("/share/{}", public_id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored_blob_count(&t.files_dir), 0);

    let (status, _) = send(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&t.app, delete(&format!("/share/{}", public_id), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_shares_are_private_to_their_owner() {
    let t = setup_app().await;
    let owner = register_and_login(&t.app, "frank").await;
    let other = register_and_login(&t.app, "grace").await;

    let share = upload(&t.app, &owner, &[("mine.txt", "mine")]).await;
    let public_id = share["public_id"].as_str().unwrap();

    let (status, _) = send(&t.app, get(&format!("/share/{}", public_id), Some(&other))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&t.app, delete(&format!("/share/{}", public_id), &other)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = send_json(&t.app, get("/shares", Some(&other))).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_requests() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "heidi").await;

    // No access token
    let (status, _) = send(&t.app, get("/shares", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Garbage access token
    let (status, _) = send(&t.app, get("/shares", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Access tokens are not download tokens
    let (status, _) = send(&t.app, get(&format!("/public/file/{}", token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, get("/public/file/garbage", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, get("/public/share/does-not-exist", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Upload without any file part
    let (status, _) = send(&t.app, multipart_request("/upload", &token, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Duplicate registration
    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            "/register",
            None,
            r#"{"username": "heidi", "password": "password123"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong password
    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            "/login",
            None,
            r#"{"username": "heidi", "password": "nope"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_check() {
    let t = setup_app().await;
    let (status, json) = send_json(&t.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "connected");
    assert_eq!(json["storage"], "available");
}

#[tokio::test]
async fn test_download_of_missing_blob_is_not_found() {
    let t = setup_app().await;
    let token = register_and_login(&t.app, "ivan").await;
    let share = upload(&t.app, &token, &[("lost.txt", "soon gone")]).await;
    let public_id = share["public_id"].as_str().unwrap();

    let (_, json) = send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    let download_token = json["files"][0]["token"].as_str().unwrap().to_string();

    // The record outlives its blob
    for entry in std::fs::read_dir(t.files_dir.path()).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
    assert_eq!(stored_blob_count(&t.files_dir), 0);

    let (status, json) =
        send_json(&t.app, get(&format!("/public/file/{}", download_token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "File not found");

    // The share itself is still listed
    let (status, json) = send_json(&t.app, get(&format!("/public/share/{}", public_id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["files"].as_array().unwrap().len(), 1);
}
