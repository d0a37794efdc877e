use portus::buffer::ByteBuffer;
use portus::http::{Content, ResponseBuilder};
use portus::resolve::{Body, ResolvedAction};

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(tag: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "portus-{tag}-{}-{}-{}",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(dir: &Path, name: &str, contents: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    path
}

fn header_text(out: &ByteBuffer) -> String {
    String::from_utf8_lossy(out.peek()).into_owned()
}

const INDEX: &str = "<html><body>index</body></html>";
const NOT_FOUND: &str = "<html><body>custom not found</body></html>";

#[test]
fn page_is_mapped_after_headers() {
    let dir = temp_dir("resp-page");
    let index = write_file(&dir, "index.html", INDEX, 0o644);

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::page(&index), true, &mut out);

    assert_eq!(prepared.status, 200);
    assert_eq!(prepared.content_length, INDEX.len() as u64);

    let text = header_text(&out);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Connection: keep-alive\r\n"));
    assert!(text.contains("keep-alive: max=6, timeout=120\r\n"));
    assert!(text.contains("Content-Type: text/html\r\n"));
    assert!(text.ends_with(&format!("Content-Length: {}\r\n\r\n", INDEX.len())));

    match prepared.content {
        Some(Content::Mapped(map)) => assert_eq!(map.as_slice(), INDEX.as_bytes()),
        other => panic!("expected a mapping, got {other:?}"),
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn keep_alive_parameters_are_configurable() {
    let dir = temp_dir("resp-ka");
    let index = write_file(&dir, "index.html", INDEX, 0o644);

    let builder = ResponseBuilder::new(&dir).keep_alive(10, 30);
    let mut out = ByteBuffer::new();
    builder.build(ResolvedAction::page(&index), true, &mut out);

    assert!(header_text(&out).contains("keep-alive: max=10, timeout=30\r\n"));

    let mut out = ByteBuffer::new();
    builder.build(ResolvedAction::page(&index), false, &mut out);

    let text = header_text(&out);
    assert!(text.contains("Connection: close\r\n"));
    assert!(!text.contains("keep-alive: max="));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_file_serves_the_custom_error_page() {
    let dir = temp_dir("resp-404");
    write_file(&dir, "404.html", NOT_FOUND, 0o644);

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::page(dir.join("nope.html")), false, &mut out);

    assert_eq!(prepared.status, 404);
    assert_eq!(prepared.content_length, NOT_FOUND.len() as u64);

    let text = header_text(&out);
    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(text.contains(&format!("Content-Length: {}\r\n", NOT_FOUND.len())));
    assert!(prepared.content.is_some());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_error_page_falls_back_to_inline_html() {
    let dir = temp_dir("resp-inline");

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::page(dir.join("nope.html")), false, &mut out);

    assert_eq!(prepared.status, 404);
    assert!(prepared.content.is_none());

    let text = header_text(&out);
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    assert!(head.contains(&format!("Content-Length: {}", body.len())));
    assert!(body.contains("404 : Not Found"));
    assert!(body.contains("File Not Found!"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn directory_target_is_not_found() {
    let dir = temp_dir("resp-dir");
    fs::create_dir_all(dir.join("sub")).unwrap();

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::page(dir.join("sub")), false, &mut out);

    assert_eq!(prepared.status, 404);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn private_file_is_forbidden() {
    let dir = temp_dir("resp-403");
    let secret = write_file(&dir, "secret.html", "hidden", 0o600);

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::page(&secret), false, &mut out);

    assert_eq!(prepared.status, 403);
    assert!(header_text(&out).starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert!(!header_text(&out).contains("hidden"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unknown_status_becomes_bad_request() {
    let dir = temp_dir("resp-unknown");

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::error(418), false, &mut out);

    assert_eq!(prepared.status, 400);
    assert!(header_text(&out).starts_with("HTTP/1.1 400 Bad Request\r\n"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn cookie_and_inline_body() {
    let dir = temp_dir("resp-cookie");

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let action = ResolvedAction::json(200, r#"{"username":"alice"}"#.to_owned())
        .with_cookie("session_id=abc; path=/; HttpOnly");
    let prepared = builder.build(action, true, &mut out);

    assert_eq!(prepared.status, 200);
    assert!(prepared.content.is_none());

    let text = header_text(&out);
    assert!(text.contains("Set-Cookie: session_id=abc; path=/; HttpOnly\r\n"));
    assert!(text.contains("Content-Type: application/json\r\n"));
    assert!(text.ends_with("\r\n\r\n{\"username\":\"alice\"}"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn download_uses_sendfile_with_disposition() {
    let dir = temp_dir("resp-download");
    let report = write_file(&dir, "report.pdf", "%PDF-1.4 fake", 0o644);

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::download(&report), false, &mut out);

    assert_eq!(prepared.status, 200);

    let text = header_text(&out);
    assert!(text.contains("Content-Type: application/pdf\r\n"));
    assert!(text.contains("Content-Disposition: attachment; filename=\"report.pdf\"\r\n"));

    match prepared.content {
        Some(Content::File(file)) => assert_eq!(file.len(), 13),
        other => panic!("expected a file source, got {other:?}"),
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn download_name_cannot_break_the_header() {
    let dir = temp_dir("resp-download-name");
    let report = write_file(&dir, "re\"po\r\nSet-Cookie: x=1\\rt.txt", "report", 0o644);

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::download(&report), false, &mut out);

    assert_eq!(prepared.status, 200);

    let text = header_text(&out);
    assert!(text.contains(
        "Content-Disposition: attachment; filename=\"repoSet-Cookie: x=1rt.txt\"\r\n"
    ));
    assert!(!text.contains("\r\nSet-Cookie"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn empty_file_sends_headers_only() {
    let dir = temp_dir("resp-empty");
    let empty = write_file(&dir, "empty.html", "", 0o644);

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::page(&empty), false, &mut out);

    assert_eq!(prepared.status, 200);
    assert_eq!(prepared.content_length, 0);
    assert!(prepared.content.is_none());
    assert!(header_text(&out).ends_with("Content-Length: 0\r\n\r\n"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn empty_success_body_is_plain_text() {
    let dir = temp_dir("resp-nobody");

    let builder = ResponseBuilder::new(&dir);
    let mut out = ByteBuffer::new();
    let prepared = builder.build(ResolvedAction::new(200, Body::Empty), false, &mut out);

    assert_eq!(prepared.content_length, 0);
    assert!(header_text(&out).contains("Content-Type: text/plain\r\n"));

    let _ = fs::remove_dir_all(dir);
}
