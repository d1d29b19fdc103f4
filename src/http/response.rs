use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::buffer::Buffer;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

/// Extension -> MIME type table, per SPEC_FULL.md §6.
fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("xml") => "text/xml",
        Some("xhtml") => "application/xhtml+xml",
        Some("txt") => "text/plain",
        Some("rtf") => "application/rtf",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("au") => "audio/basic",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("avi") => "video/x-msvideo",
        Some("gz") => "application/x-gzip",
        Some("tar") => "application/x-tar",
        Some("css") => "text/css",
        Some("js") => "application/x-javascript",
        _ => "text/plain;charset=utf-8",
    }
}

/// Builds the status line + header block and memory-maps the body file,
/// the Rust translation of the original `HttpResponse` (mmap-backed
/// `FileLen()/File()`, `ErrorContent` fallback). The mapped view forms the
/// second element of the connection's gather-write vector.
#[derive(Debug, Default)]
pub struct HttpResponse {
    pub code: u16,
    pub keep_alive: bool,
    file_path: PathBuf,
    mmap: Option<Mmap>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context for the next response cycle, dropping any mapped
    /// file from the previous one.
    pub fn init(&mut self, root: &Path, path: &str, keep_alive: bool, code: u16) {
        self.unmap();
        self.keep_alive = keep_alive;
        self.code = code;
        self.file_path = root.join(path.trim_start_matches('/'));
    }

    pub fn unmap(&mut self) {
        self.mmap = None;
    }

    /// Resolves the target file's status, writes the status line and
    /// headers into `write_buf`, and — on 200 — memory-maps the file body.
    /// On any non-200 code, a small embedded HTML body is appended to
    /// `write_buf` directly instead.
    pub fn make_response(&mut self, write_buf: &mut Buffer) -> std::io::Result<()> {
        self.code = self.resolve_code();

        if self.code == STATUS_OK {
            let file = File::open(&self.file_path)?;
            let mmap = unsafe { Mmap::map(&file)? };
            let len = mmap.len();
            let content_type = mime_type(&self.file_path).to_string();
            self.mmap = Some(mmap);
            self.write_headers(write_buf, &content_type, len);
        } else {
            self.mmap = None;
            let body = error_body(self.code);
            self.write_headers(write_buf, "text/html", body.len());
            write_buf.append(&body);
        }
        Ok(())
    }

    fn resolve_code(&self) -> u16 {
        if self.code != STATUS_OK {
            return self.code;
        }
        match std::fs::metadata(&self.file_path) {
            Err(_) => STATUS_NOT_FOUND,
            Ok(meta) => {
                if !meta.is_file() {
                    return STATUS_FORBIDDEN;
                }
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if meta.permissions().mode() & 0o004 == 0 {
                        return STATUS_FORBIDDEN;
                    }
                }
                STATUS_OK
            }
        }
    }

    fn write_headers(&self, write_buf: &mut Buffer, content_type: &str, content_length: usize) {
        let conn = if self.keep_alive { "keep-alive" } else { "close" };
        let header = format!(
            "HTTP/1.1 {} {}\r\nConnection: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            self.code,
            status_text(self.code),
            conn,
            content_type,
            content_length
        );
        write_buf.append(header.as_bytes());
    }

    /// The memory-mapped file body, if the response resolved to 200.
    pub fn file_bytes(&self) -> Option<&[u8]> {
        self.mmap.as_deref()
    }
}

fn error_body(code: u16) -> Vec<u8> {
    format!(
        "<html><body><h1>{} {}</h1></body></html>",
        code,
        status_text(code)
    )
    .into_bytes()
}
