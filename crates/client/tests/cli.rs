use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::{StatusCode, header};
use axum::routing::post;
use binpatch::{MIME_TYPE, PatchBuilder};

struct FakeServer {
    url: String,
    hits: Arc<AtomicUsize>,
}

async fn serve(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> FakeServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/sign",
        post({
            let hits = Arc::clone(&hits);
            move || async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (status, [(header::CONTENT_TYPE, content_type)], body)
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    FakeServer {
        url: format!("http://{addr}"),
        hits,
    }
}

/// Run `signer-client sign` off the runtime so the fake server keeps serving.
async fn client(args: Vec<String>, url: Option<&str>) -> Output {
    let url = url.map(str::to_owned);
    tokio::task::spawn_blocking(move || {
        let mut command = Command::new(env!("CARGO_BIN_EXE_signer-client"));
        command.arg("sign").args(args).env_remove("RUST_LOG");
        match url {
            Some(url) => command.env("SIGNER_URL", url),
            None => command.env_remove("SIGNER_URL"),
        };
        command.output().unwrap()
    })
    .await
    .unwrap()
}

fn sign_args(url: &str, file: &Path, extra: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--url".to_string(),
        url.to_string(),
        "--file".to_string(),
        file.display().to_string(),
        "--key".to_string(),
        "release".to_string(),
    ];
    args.extend(extra.iter().map(|arg| arg.to_string()));
    args
}

fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[tokio::test]
async fn patch_to_stdout_prints_signed_bytes() {
    let patch = PatchBuilder::new()
        .copy(0, 5)
        .insert(b"SIG")
        .expected_len(8)
        .build()
        .encode();
    let server = serve(StatusCode::OK, MIME_TYPE, patch).await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "app.bin", b"hello");

    let output = client(sign_args(&server.url, &file, &["--output", "-"]), None).await;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(output.stdout, b"helloSIG");
    assert!(
        stderr(&output).contains(&format!("Signed {}", file.display())),
        "{}",
        stderr(&output)
    );
    assert_eq!(std::fs::read(&file).unwrap(), b"hello");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_artifact_to_stdout_prints_body() {
    let server = serve(
        StatusCode::OK,
        "application/octet-stream",
        b"hello, signed".to_vec(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "app.bin", b"hello");

    let output = client(sign_args(&server.url, &file, &["-o", "-"]), None).await;

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(output.stdout, b"hello, signed");
    assert_eq!(std::fs::read(&file).unwrap(), b"hello");
}

#[tokio::test]
async fn signs_in_place_with_url_from_environment() {
    let patch = PatchBuilder::new()
        .copy(0, 5)
        .insert(b"SIG")
        .expected_len(8)
        .build()
        .encode();
    let server = serve(StatusCode::OK, MIME_TYPE, patch).await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "app.bin", b"hello");

    let args = vec![
        "--file".to_string(),
        file.display().to_string(),
        "--key".to_string(),
        "release".to_string(),
    ];
    let output = client(args, Some(&server.url)).await;

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(output.stdout.is_empty());
    assert_eq!(std::fs::read(&file).unwrap(), b"helloSIG");
}

#[tokio::test]
async fn remote_error_exits_nonzero() {
    let server = serve(StatusCode::NOT_FOUND, "text/plain", b"key not found".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "app.bin", b"hello");

    let output = client(sign_args(&server.url, &file, &[]), None).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(
        stderr(&output).contains("error: remote signing failed (404 Not Found): key not found"),
        "{}",
        stderr(&output)
    );
    assert!(!stderr(&output).contains("Signed "));
    assert_eq!(std::fs::read(&file).unwrap(), b"hello");
}

#[tokio::test]
async fn empty_key_is_rejected_before_upload() {
    let server = serve(StatusCode::OK, MIME_TYPE, Vec::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "app.bin", b"hello");

    let args = vec![
        "--url".to_string(),
        server.url.clone(),
        "--file".to_string(),
        file.display().to_string(),
        "--key".to_string(),
        String::new(),
    ];
    let output = client(args, None).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: "), "{}", stderr(&output));
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
}
