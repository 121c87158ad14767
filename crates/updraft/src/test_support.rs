//! In-process HTTP responder for transport tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One canned response.
pub struct Canned {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A request as seen by the responder.
#[derive(Debug)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serve `responses` in order, one connection each. Returns the base URL and
/// a handle yielding every request received.
pub fn serve(responses: Vec<Canned>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind test server");
    let address = listener.local_addr().expect("must read test server address");

    let handle = thread::spawn(move || {
        let mut seen = Vec::with_capacity(responses.len());
        for canned in responses {
            let (stream, _) = listener.accept().expect("must accept test client");
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("must read request line");
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let target = parts.next().unwrap_or_default().to_string();

            let mut headers = Vec::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("must read header");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    headers.push((key.trim().to_string(), value.trim().to_string()));
                }
            }

            let length = headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.parse::<usize>().ok())
                .unwrap_or(0);
            let mut body = vec![0_u8; length];
            reader.read_exact(&mut body).expect("must read request body");

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {} Canned\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                canned.status,
                canned.body.len()
            )
            .expect("must write response headers");
            stream.write_all(&canned.body).expect("must write response body");
            stream.flush().expect("must flush response");

            seen.push(Recorded {
                method,
                target,
                headers,
                body,
            });
        }
        seen
    });

    (format!("http://{address}"), handle)
}

/// Accept one connection, write `prelude`, then hold the socket open for
/// `hold` without sending anything else.
pub fn stall(prelude: &'static [u8], hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind stalling server");
    let address = listener.local_addr().expect("must read stalling server address");

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("must accept test client");
        stream.write_all(prelude).expect("must write prelude");
        stream.flush().expect("must flush prelude");
        thread::sleep(hold);
    });

    format!("http://{address}")
}

/// A base URL nothing listens on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind probe");
    let address = listener.local_addr().expect("must read probe address");
    drop(listener);
    format!("http://{address}")
}
