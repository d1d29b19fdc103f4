use crate::buffer::Buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MalformedRequestLine,
    UnsupportedMethod(String),
    MalformedHeaderLine,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::UnsupportedMethod(m) => write!(f, "unsupported method: {m}"),
            ParseError::MalformedHeaderLine => write!(f, "malformed header line"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Which form the login/register path resolves to, per SPEC_FULL.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTag {
    Login,
    Register,
}

/// Paths that get a bare `.html` suffix appended once rewritten from their
/// pageless name (SPEC_FULL.md §6 path-rewriting table).
const PAGELESS_NAMES: [&str; 6] = [
    "/index",
    "/register",
    "/login",
    "/welcome",
    "/video",
    "/picture",
];

fn rewrite_path(path: &str) -> String {
    if path == "/" {
        return "/index.html".to_string();
    }
    if PAGELESS_NAMES.contains(&path) {
        return format!("{path}.html");
    }
    path.to_string()
}

/// Resumable HTTP/1.1 request parser state machine, driven one `CRLF`-line
/// at a time over a `Buffer`. Direct translation of the original project's
/// `HttpRequest::parse` line-loop (manual string splitting, no regex
/// engine), trimmed of the CGI/chunked/multipart branches that are out of
/// scope here.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Path after the rewrite table has been applied.
    pub path: String,
    pub version: String,
    /// Insertion-ordered so response/log output is reproducible even
    /// though the wire format does not require any particular order
    /// (SPEC_FULL.md §9 design note).
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub post: std::collections::HashMap<String, String>,
    pub state: ParsingState,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            method: Method::Get,
            path: String::new(),
            version: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
            post: std::collections::HashMap::new(),
            state: ParsingState::RequestLine,
        }
    }

    /// Resets to the state needed for the next request cycle on a
    /// keep-alive connection (or a pipelined request already in the
    /// buffer).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_keep_alive(&self) -> bool {
        self.version == "1.1"
            && self
                .header("Connection")
                .map(|v| v.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false)
    }

    pub fn is_form_urlencoded(&self) -> bool {
        self.header("Content-Type")
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    pub fn auth_tag(&self) -> Option<AuthTag> {
        match self.path.as_str() {
            "/register.html" => Some(AuthTag::Register),
            "/login.html" => Some(AuthTag::Login),
            _ => None,
        }
    }

    /// Drains as many complete lines/segments as `buf` currently holds,
    /// advancing `self.state` accordingly. Returns `Ok(true)` once parsing
    /// has reached `Finish`, `Ok(false)` if more data is needed, or `Err`
    /// on a malformed request line/header.
    pub fn parse(&mut self, buf: &mut Buffer) -> Result<bool, ParseError> {
        loop {
            match self.state {
                ParsingState::RequestLine => match Self::take_line(buf) {
                    Some(line) => self.parse_request_line(&line)?,
                    None => return Ok(false),
                },
                ParsingState::Headers => match Self::take_line(buf) {
                    Some(line) => {
                        if line.is_empty() {
                            self.state = ParsingState::Body;
                        } else {
                            self.parse_header_line(&line)?;
                        }
                    }
                    None => return Ok(false),
                },
                ParsingState::Body => {
                    let body = buf.peek().to_vec();
                    buf.retrieve(body.len());
                    if self.is_form_urlencoded() {
                        self.post = parse_urlencoded_form(&body);
                    }
                    self.body = body;
                    self.state = ParsingState::Finish;
                    return Ok(true);
                }
                ParsingState::Finish => return Ok(true),
            }
        }
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let mut parts = line.split_whitespace();
        let (Some(method), Some(path), Some(version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MalformedRequestLine);
        };
        if parts.next().is_some() {
            return Err(ParseError::MalformedRequestLine);
        }
        self.method = match method {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => return Err(ParseError::UnsupportedMethod(other.to_string())),
        };
        let version = version
            .strip_prefix("HTTP/")
            .ok_or(ParseError::MalformedRequestLine)?;
        self.version = version.to_string();
        self.path = rewrite_path(path);
        self.state = ParsingState::Headers;
        Ok(())
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), ParseError> {
        let colon = line.find(':').ok_or(ParseError::MalformedHeaderLine)?;
        let key = line[..colon].trim().to_string();
        let mut value = &line[colon + 1..];
        value = value.strip_prefix(' ').unwrap_or(value);
        self.headers.push((key, value.trim_end().to_string()));
        Ok(())
    }

    /// Pulls one CRLF-terminated line out of `buf`, consuming the
    /// terminator. Returns `None` (leaving `buf` untouched) if no full
    /// line is available yet.
    fn take_line(buf: &mut Buffer) -> Option<String> {
        let data = buf.peek();
        let idx = find_crlf(data)?;
        let line = String::from_utf8_lossy(&data[..idx]).into_owned();
        buf.retrieve(idx + 2);
        Some(line)
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Decodes an `application/x-www-form-urlencoded` body into a flat map,
/// per SPEC_FULL.md §4.6: `&` separates pairs, `=` separates key/value,
/// `+` decodes to space, `%HH` decodes to the corresponding byte.
pub fn parse_urlencoded_form(body: &[u8]) -> std::collections::HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    let mut map = std::collections::HashMap::new();
    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut it = pair.splitn(2, '=');
        let key = it.next().unwrap_or("");
        let value = it.next().unwrap_or("");
        map.insert(percent_decode(key), percent_decode(value));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut Buffer, data: &[u8]) {
        buf.append(data);
    }

    #[test]
    fn parses_simple_get_request() {
        let mut buf = Buffer::new();
        feed(&mut buf, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let mut req = HttpRequest::new();
        assert!(req.parse(&mut buf).unwrap());
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.header("Host"), Some("example.com"));
        assert_eq!(req.state, ParsingState::Finish);
    }

    #[test]
    fn resumes_across_fragmented_feeds() {
        let mut buf = Buffer::new();
        let mut req = HttpRequest::new();

        feed(&mut buf, b"GET /login");
        assert!(!req.parse(&mut buf).unwrap());

        feed(&mut buf, b" HTTP/1.1\r\nHost: x\r\n");
        assert!(!req.parse(&mut buf).unwrap());

        feed(&mut buf, b"\r\n");
        assert!(req.parse(&mut buf).unwrap());
        assert_eq!(req.path, "/login.html");
    }

    #[test]
    fn rejects_malformed_request_line() {
        let mut buf = Buffer::new();
        feed(&mut buf, b"POTATO\r\n\r\n");
        let mut req = HttpRequest::new();
        assert!(req.parse(&mut buf).is_err());
    }

    #[test]
    fn decodes_form_urlencoded_post_body() {
        let mut buf = Buffer::new();
        feed(
            &mut buf,
            b"POST /login.html HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nusername=alice&password=a%2Bb+c",
        );
        let mut req = HttpRequest::new();
        assert!(req.parse(&mut buf).unwrap());
        assert_eq!(req.post.get("username").map(String::as_str), Some("alice"));
        assert_eq!(req.post.get("password").map(String::as_str), Some("a+b c"));
        assert_eq!(req.auth_tag(), Some(AuthTag::Login));
    }

    #[test]
    fn keep_alive_requires_http_1_1_and_header() {
        let mut buf = Buffer::new();
        feed(&mut buf, b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        let mut req = HttpRequest::new();
        req.parse(&mut buf).unwrap();
        assert!(req.is_keep_alive());
    }
}
