use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use httpd::buffer::Buffer;
use httpd::http::request::{HttpRequest, Method, ParsingState};
use httpd::http::response::{HttpResponse, STATUS_BAD_REQUEST, STATUS_NOT_FOUND, STATUS_OK};

fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    let mut f = File::create(dir.join(name)).unwrap();
    f.write_all(contents).unwrap();
}

/// E1: a GET for an existing file serves 200 with the file's exact bytes.
#[test]
fn e1_static_get_200() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "index.html", b"<h1>hello</h1>");

    let mut buf = Buffer::new();
    buf.append(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    let mut req = HttpRequest::new();
    assert!(req.parse(&mut buf).unwrap());
    assert_eq!(req.method, Method::Get);

    let mut res = HttpResponse::new();
    res.init(dir.path(), &req.path, req.is_keep_alive(), STATUS_OK);
    let mut write_buf = Buffer::new();
    res.make_response(&mut write_buf).unwrap();

    let headers = String::from_utf8_lossy(write_buf.peek()).into_owned();
    assert!(headers.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(headers.contains("Content-Length: 14"));
    assert_eq!(res.file_bytes(), Some(b"<h1>hello</h1>".as_slice()));
}

/// E2: a GET for a file that doesn't exist serves 404.
#[test]
fn e2_not_found_404() {
    let dir = tempfile::tempdir().unwrap();
    let mut buf = Buffer::new();
    buf.append(b"GET /nope.html HTTP/1.1\r\n\r\n");
    let mut req = HttpRequest::new();
    assert!(req.parse(&mut buf).unwrap());

    let mut res = HttpResponse::new();
    res.init(dir.path(), &req.path, false, STATUS_OK);
    let mut write_buf = Buffer::new();
    res.make_response(&mut write_buf).unwrap();
    assert_eq!(res.code, STATUS_NOT_FOUND);
}

/// E3: a malformed request line is rejected by the parser (the connection
/// layer is what turns this into a 400 response — see `Connection::process`).
#[test]
fn e3_malformed_request_rejected_by_parser() {
    let mut buf = Buffer::new();
    buf.append(b"POTATO / HTTP/9\r\n\r\n");
    let mut req = HttpRequest::new();
    let err = req.parse(&mut buf).unwrap_err();
    assert_eq!(
        format!("{err}"),
        "unsupported method: POTATO"
    );

    // The connection layer maps any parse error onto a 400 response.
    let dir = tempfile::tempdir().unwrap();
    let mut res = HttpResponse::new();
    res.init(dir.path(), "/", false, STATUS_BAD_REQUEST);
    let mut write_buf = Buffer::new();
    res.make_response(&mut write_buf).unwrap();
    let headers = String::from_utf8_lossy(write_buf.peek()).into_owned();
    assert!(headers.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[test]
fn fragmented_request_resumes_across_feeds() {
    let mut buf = Buffer::new();
    let mut req = HttpRequest::new();

    buf.append(b"GET /pic");
    assert!(!req.parse(&mut buf).unwrap());
    assert_eq!(req.state, ParsingState::RequestLine);

    buf.append(b"ture HTTP/1.1\r\n");
    assert!(!req.parse(&mut buf).unwrap());
    assert_eq!(req.state, ParsingState::Headers);

    buf.append(b"Host: x\r\n\r\n");
    assert!(req.parse(&mut buf).unwrap());
    assert_eq!(req.path, "/picture.html");
}

#[test]
fn post_request_body_and_form_decode() {
    let mut buf = Buffer::new();
    buf.append(
        b"POST /register.html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 27\r\n\r\nusername=bob&password=hunter2",
    );
    let mut req = HttpRequest::new();
    assert!(req.parse(&mut buf).unwrap());
    assert_eq!(req.method, Method::Post);
    assert_eq!(req.post.get("username").map(String::as_str), Some("bob"));
    assert_eq!(req.post.get("password").map(String::as_str), Some("hunter2"));
}
