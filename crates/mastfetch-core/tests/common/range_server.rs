//! Minimal HTTP/1.1 server with HEAD and Range GET support for
//! integration tests.
//!
//! Serves one static body per path. Responds to HEAD with Content-Length,
//! to ranged GETs with 206 Partial Content, and to out-of-range resumes
//! with 416. Fault injection covers flaky starts (503s before success) and
//! a one-shot mid-body connection drop, which is what the retry/resume
//! paths need to prove themselves against.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Clone)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET responses omit Content-Length and Content-Range, so
    /// the client can only learn the size by reading to EOF.
    pub advertise_length: bool,
    /// Serve this many 503s per path before the first success.
    pub fail_first_requests: u32,
    /// Close the connection once after this many body bytes.
    pub drop_once_after: Option<u64>,
    /// Write the body in pieces of this size with a pause between them, so
    /// tests can interleave pause/cancel with an in-flight transfer.
    pub throttle: Option<(usize, std::time::Duration)>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            advertise_length: true,
            fail_first_requests: 0,
            drop_once_after: None,
            throttle: None,
        }
    }
}

struct ServedFile {
    body: Vec<u8>,
    failures_left: AtomicU32,
    drop_pending: AtomicBool,
}

/// Starts a server in a background thread serving `files` (path -> body).
/// Returns the base URL, e.g. `http://127.0.0.1:PORT`. Runs until the
/// process exits.
pub fn start(files: Vec<(&str, Vec<u8>)>) -> String {
    start_with_options(files, RangeServerOptions::default())
}

pub fn start_with_options(files: Vec<(&str, Vec<u8>)>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();

    let mut map = HashMap::new();
    for (path, body) in files {
        map.insert(
            path.to_string(),
            ServedFile {
                body,
                failures_left: AtomicU32::new(opts.fail_first_requests),
                drop_pending: AtomicBool::new(opts.drop_once_after.is_some()),
            },
        );
    }
    let files = Arc::new(map);
    let opts = Arc::new(opts);

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            let opts = Arc::clone(&opts);
            thread::spawn(move || handle(stream, &files, &opts));
        }
    });
    format!("http://127.0.0.1:{port}")
}

fn handle(
    mut stream: std::net::TcpStream,
    files: &HashMap<String, ServedFile>,
    opts: &RangeServerOptions,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, path, range) = parse_request(request);

    let Some(file) = files.get(path) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    };
    let total = file.body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n"
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    if file
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
    {
        let _ = stream.write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let (status, range_header, slice) = match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total {
                (
                    "416 Range Not Satisfiable",
                    Some(format!("bytes */{total}")),
                    &file.body[0..0],
                )
            } else {
                let start_us = start as usize;
                let end_excl = (end_incl + 1).min(total) as usize;
                (
                    "206 Partial Content",
                    Some(format!("bytes {start}-{}/{total}", end_excl - 1)),
                    &file.body[start_us..end_excl],
                )
            }
        }
        None => ("200 OK", None, &file.body[..]),
    };

    let mut headers = String::new();
    if opts.advertise_length {
        headers.push_str(&format!("Content-Length: {}\r\n", slice.len()));
        if let Some(range_header) = &range_header {
            headers.push_str(&format!("Content-Range: {range_header}\r\n"));
        }
        headers.push_str("Accept-Ranges: bytes\r\n");
    }
    headers.push_str("Connection: close\r\n");
    let response = format!("HTTP/1.1 {status}\r\n{headers}\r\n");
    let _ = stream.write_all(response.as_bytes());

    if let Some(drop_after) = opts.drop_once_after {
        if status.starts_with("2")
            && slice.len() as u64 > drop_after
            && file.drop_pending.swap(false, Ordering::SeqCst)
        {
            let _ = stream.write_all(&slice[..drop_after as usize]);
            // Drop the stream mid-body: simulates a dying connection.
            return;
        }
    }

    match opts.throttle {
        Some((piece, delay)) if piece > 0 => {
            for chunk in slice.chunks(piece) {
                if stream.write_all(chunk).is_err() {
                    return;
                }
                thread::sleep(delay);
            }
        }
        _ => {
            let _ = stream.write_all(slice);
        }
    }
}

/// Returns (method, path, optional (start, end_inclusive) from
/// `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut method = "";
    let mut path = "/";
    let mut range = None;
    for (i, line) in request.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if i == 0 {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("");
            path = parts.next().unwrap_or("/");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = spec.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, path, range)
}
