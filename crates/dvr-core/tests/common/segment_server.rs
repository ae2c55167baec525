//! Minimal HTTP/1.1 server for integration tests: serves a fixed route table.
//!
//! Each route maps an exact request path to a canned response. A route can be
//! told to answer its first N requests with 503 so retry behavior can be
//! exercised. Connections are closed after one response.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

/// One served route.
pub struct Route {
    body: Vec<u8>,
    status: u16,
    /// Respond 503 to this many requests before serving the real response.
    fail_first: u32,
    seen: AtomicU32,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            status: 200,
            fail_first: 0,
            seen: AtomicU32::new(0),
        }
    }

    /// Always answers with `status` and an empty body.
    pub fn error(status: u16) -> Self {
        Self {
            body: Vec::new(),
            status,
            fail_first: 0,
            seen: AtomicU32::new(0),
        }
    }

    /// 503 for the first `fail_first` requests, then 200 with `body`.
    pub fn flaky(body: impl Into<Vec<u8>>, fail_first: u32) -> Self {
        Self {
            body: body.into(),
            status: 200,
            fail_first,
            seen: AtomicU32::new(0),
        }
    }
}

/// Starts a server on a random port serving `routes`. Returns the base URL
/// (e.g. "http://127.0.0.1:12345"). The server runs until the process exits.
pub fn start(routes: HashMap<String, Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes = Arc::new(routes);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes));
        }
    });
    format!("http://127.0.0.1:{port}")
}

fn handle(mut stream: std::net::TcpStream, routes: &HashMap<String, Route>) {
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
    let Some(path) = request_path(request) else {
        return;
    };
    let Some(route) = routes.get(path) else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };

    let seen = route.seen.fetch_add(1, Ordering::SeqCst);
    if seen < route.fail_first {
        let _ = stream.write_all(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let reason = match route.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason,
        route.body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&route.body);
}

/// Returns the path of the request line ("GET /x HTTP/1.1" -> "/x").
fn request_path(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    parts.next()
}
