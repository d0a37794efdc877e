use portus::buffer::ByteBuffer;
use portus::http::{ParseStatus, Request, RequestParser};
use portus::resolve::{Body, Resolve, ResolvedAction, StaticResolver};

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn get(path: &str) -> Request {
    let mut buffer = ByteBuffer::new();
    buffer.append_str(&format!("GET {path} HTTP/1.1\r\n\r\n"));

    match RequestParser::default().parse(&mut buffer) {
        ParseStatus::Complete(request) => request,
        other => panic!("fixture did not parse: {other:?}"),
    }
}

fn fixture() -> (PathBuf, StaticResolver) {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let root = std::env::temp_dir().join(format!(
        "portus-resolve-{}-{nanos}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let resources = root.join("resources");
    fs::create_dir_all(&resources).unwrap();
    fs::write(resources.join("index.html"), "index").unwrap();
    fs::write(resources.join("picture.html"), "picture").unwrap();

    let resolver = StaticResolver::new(&resources, root.join("data"));
    (root, resolver)
}

#[test]
fn root_maps_to_index() {
    let (root, resolver) = fixture();

    assert_eq!(
        resolver.resolve(&get("/")),
        ResolvedAction::page(root.join("resources/index.html"))
    );

    let _ = fs::remove_dir_all(root);
}

#[test]
fn extensionless_path_prefers_html_sibling() {
    let (root, resolver) = fixture();

    assert_eq!(
        resolver.resolve(&get("/picture")),
        ResolvedAction::page(root.join("resources/picture.html"))
    );
    assert_eq!(
        resolver.resolve(&get("/missing")),
        ResolvedAction::page(root.join("resources/missing"))
    );
    assert_eq!(
        resolver.resolve(&get("/style.css?v=2")),
        ResolvedAction::page(root.join("resources/style.css"))
    );

    let _ = fs::remove_dir_all(root);
}

#[test]
fn downloads_map_into_the_data_directory() {
    let (root, resolver) = fixture();

    let action = resolver.resolve(&get("/download/report.pdf"));
    assert_eq!(action.body, Body::Download(root.join("data/report.pdf")));

    assert_eq!(resolver.resolve(&get("/download/")), ResolvedAction::error(404));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn traversal_is_forbidden() {
    let (root, resolver) = fixture();

    for path in ["/../etc/passwd", "/a/../../b", "/download/../secret", "relative"] {
        assert_eq!(
            resolver.resolve(&get(path)),
            ResolvedAction::error(403),
            "{path}"
        );
    }

    let _ = fs::remove_dir_all(root);
}

#[test]
fn absolute_and_empty_segments_are_forbidden() {
    let (root, resolver) = fixture();

    for path in [
        "/download//etc/passwd",
        "/download/a//b",
        "/download/./report.pdf",
        "//etc/passwd",
        "/picture//x",
    ] {
        assert_eq!(
            resolver.resolve(&get(path)),
            ResolvedAction::error(403),
            "{path}"
        );
    }

    let _ = fs::remove_dir_all(root);
}

#[test]
fn shared_resolver_resolves_through_arc() {
    let (root, resolver) = fixture();
    let shared: Arc<dyn Resolve> = Arc::new(resolver);

    assert_eq!(shared.resolve(&get("/")).status, 200);

    let _ = fs::remove_dir_all(root);
}
