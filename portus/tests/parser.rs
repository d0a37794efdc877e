use portus::buffer::ByteBuffer;
use portus::http::{Method, ParseError, ParseStatus, Request, RequestParser};

const GET: &[u8] = b"GET /index.html?name=a%20b&x=1 HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n";
const POST: &[u8] =
    b"POST /login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 27\r\n\r\nusername=ann&password=s3cr3";

fn parse_all(bytes: &[u8]) -> Request {
    let mut parser = RequestParser::default();
    let mut buffer = ByteBuffer::new();
    buffer.append(bytes);

    match parser.parse(&mut buffer) {
        ParseStatus::Complete(request) => request,
        other => panic!("expected a complete request, got {other:?}"),
    }
}

/// Feeds `bytes` split at `cuts`, parsing after every piece.
fn parse_fragmented(bytes: &[u8], cuts: &[usize]) -> Request {
    let mut parser = RequestParser::default();
    let mut buffer = ByteBuffer::new();
    let mut start = 0;

    for end in cuts.iter().copied().chain(std::iter::once(bytes.len())) {
        buffer.append(&bytes[start..end]);
        start = end;

        match parser.parse(&mut buffer) {
            ParseStatus::NeedMoreData => continue,
            ParseStatus::Complete(request) => {
                assert_eq!(start, bytes.len(), "completed before all bytes arrived");
                return request;
            }
            ParseStatus::Malformed(e) => panic!("malformed: {e}"),
        }
    }

    panic!("request never completed");
}

#[test]
fn parses_request_line_query_and_headers() {
    let request = parse_all(GET);

    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path, "/index.html");
    assert_eq!(request.version, "1.1");
    assert_eq!(request.query.get("name").map(String::as_str), Some("a b"));
    assert_eq!(request.query.get("x").map(String::as_str), Some("1"));
    assert_eq!(request.header("Host"), Some("localhost"));
    assert!(request.keep_alive());
    assert!(request.body.is_empty());
}

#[test]
fn same_request_under_any_fragmentation() {
    let whole = parse_all(POST);

    for cut in 1..POST.len() {
        assert_eq!(parse_fragmented(POST, &[cut]), whole, "split at {cut}");
    }

    assert_eq!(parse_fragmented(POST, &[3, 4, 20, 21, 60, 90, 101]), whole);

    let every_byte: Vec<usize> = (1..POST.len()).collect();
    assert_eq!(parse_fragmented(POST, &every_byte), whole);
}

#[test]
fn pipelined_requests_parse_back_to_back() {
    let mut stream = GET.to_vec();
    stream.extend_from_slice(POST);

    let mut parser = RequestParser::default();
    let mut buffer = ByteBuffer::new();
    buffer.append(&stream);

    let ParseStatus::Complete(first) = parser.parse(&mut buffer) else {
        panic!("first request incomplete");
    };
    assert_eq!(first.path, "/index.html");
    assert_eq!(buffer.readable_bytes(), POST.len());

    let ParseStatus::Complete(second) = parser.parse(&mut buffer) else {
        panic!("second request incomplete");
    };
    assert_eq!(second.method, Method::Post);
    assert_eq!(second.body, b"username=ann&password=s3cr3");
    assert!(buffer.is_empty());

    assert!(matches!(parser.parse(&mut buffer), ParseStatus::NeedMoreData));
}

#[test]
fn body_completes_exactly_at_content_length() {
    let mut parser = RequestParser::default();
    let mut buffer = ByteBuffer::new();

    buffer.append(&POST[..POST.len() - 1]);
    assert!(matches!(parser.parse(&mut buffer), ParseStatus::NeedMoreData));

    buffer.append(&POST[POST.len() - 1..]);
    let ParseStatus::Complete(request) = parser.parse(&mut buffer) else {
        panic!("expected completion at Content-Length");
    };
    assert_eq!(request.body.len(), 27);
    assert_eq!(request.form().get("username").map(String::as_str), Some("ann"));
}

#[test]
fn unterminated_line_needs_more_data() {
    let mut parser = RequestParser::default();
    let mut buffer = ByteBuffer::new();
    buffer.append(b"GET / HTTP/1.1\r\nHost: loc");

    assert!(matches!(parser.parse(&mut buffer), ParseStatus::NeedMoreData));
    assert_eq!(buffer.peek(), b"Host: loc");
}

fn malformed(bytes: &[u8]) -> ParseError {
    let mut parser = RequestParser::default();
    let mut buffer = ByteBuffer::new();
    buffer.append(bytes);

    match parser.parse(&mut buffer) {
        ParseStatus::Malformed(e) => e,
        other => panic!("expected malformed, got {other:?}"),
    }
}

#[test]
fn rejects_malformed_input() {
    assert_eq!(malformed(b"GET /\r\n\r\n"), ParseError::BadRequestLine);
    assert_eq!(malformed(b"GET  / HTTP/1.1\r\n\r\n"), ParseError::BadRequestLine);
    assert_eq!(malformed(b"GET / FTP/1.1\r\n\r\n"), ParseError::BadRequestLine);
    assert_eq!(
        malformed(b"GET / HTTP/2.0\r\n\r\n"),
        ParseError::UnsupportedVersion("2.0".to_owned())
    );
    assert_eq!(malformed(b"GET / HTTP/1.1\r\nno colon\r\n\r\n"), ParseError::BadHeader);
    assert_eq!(
        malformed(b"POST /x HTTP/1.1\r\nContent-Length: ten\r\n\r\n"),
        ParseError::BadContentLength
    );
    assert_eq!(
        malformed(b"POST /x HTTP/1.1\r\n\r\n"),
        ParseError::LengthRequired(Method::Post)
    );
}

#[test]
fn rejects_bodies_over_the_ceiling() {
    let mut parser = RequestParser::new(16);
    let mut buffer = ByteBuffer::new();
    buffer.append(b"POST /up HTTP/1.1\r\nContent-Length: 17\r\n\r\n");

    assert!(matches!(
        parser.parse(&mut buffer),
        ParseStatus::Malformed(ParseError::BodyTooLarge {
            length: 17,
            limit: 16
        })
    ));
}

#[test]
fn keep_alive_requires_http_1_1() {
    let request = parse_all(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
    assert!(!request.keep_alive());

    let request = parse_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(!request.keep_alive());
}

#[test]
fn last_duplicate_header_wins_and_cookies_split() {
    let request = parse_all(
        b"GET / HTTP/1.1\r\nX-Tag: one\r\nx-tag: two\r\nCookie: session_id=abc; theme = dark\r\n\r\n",
    );

    assert_eq!(request.header("X-Tag"), Some("two"));

    let cookies = request.cookies();
    assert_eq!(cookies.get("session_id").map(String::as_str), Some("abc"));
    assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
}

#[test]
fn unknown_methods_are_kept() {
    let request = parse_all(b"BREW /pot HTTP/1.1\r\n\r\n");
    assert_eq!(request.method, Method::Other("BREW".to_owned()));
}
