/// Integration tests for the tool server client.
///
/// The streamable-HTTP flavour runs against a `tiny_http` mock. The legacy
/// HTTP+SSE flavour needs a response that stays open while further requests
/// arrive, so it runs against a small hand-written server on a raw
/// `TcpListener` instead.
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tiny_http::{Header, Response, Server};

use voltguard::config::schema::{McpTransportKind, ToolsConfig};
use voltguard::mcp::{McpClient, ToolInvoker};

fn rpc_reply(request: &Value) -> Option<Value> {
    let id = request.get("id")?.clone();
    let result = match request["method"].as_str()? {
        "initialize" => json!({
            "protocolVersion": request["params"]["protocolVersion"],
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "EnergyDatabase", "version": "1.2.0"}
        }),
        "tools/list" => json!({"tools": [
            {"name": "get_recent_logs", "description": "Latest detections",
             "inputSchema": {"type": "object", "properties": {"limit": {"type": "integer"}}}},
            {"name": "get_top_offending_devices"}
        ]}),
        "tools/call" => match request["params"]["name"].as_str()? {
            "get_recent_logs" => json!({"content": [
                {"type": "text", "text": "Kitchen: lights on, nobody present"}
            ]}),
            _ => json!({"content": [{"type": "text", "text": "unknown tool"}], "isError": true}),
        },
        _ => return Some(json!({"jsonrpc": "2.0", "id": id,
                                "error": {"code": -32601, "message": "method not found"}})),
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

// ---------------------------------------------------------------------------
// Streamable HTTP
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Seen {
    methods: Vec<String>,
    session_headers: Vec<Option<String>>,
    deleted: bool,
}

fn streamable_server() -> (String, Arc<Mutex<Seen>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let record = Arc::clone(&seen);

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let session = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Mcp-Session-Id"))
                .map(|h| h.value.as_str().to_string());

            if *request.method() == tiny_http::Method::Delete {
                record.lock().unwrap().deleted = session.is_some();
                let _ = request.respond(Response::empty(200));
                continue;
            }

            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let message: Value = serde_json::from_str(&body).unwrap();
            let method = message["method"].as_str().unwrap_or_default().to_string();
            {
                let mut seen = record.lock().unwrap();
                seen.methods.push(method.clone());
                seen.session_headers.push(session);
            }

            let response = match rpc_reply(&message) {
                None => Response::from_string("").with_status_code(202),
                // Tool calls answer as a short event stream.
                Some(reply) if method == "tools/call" => {
                    Response::from_string(format!("event: message\ndata: {reply}\n\n"))
                        .with_header(
                            Header::from_bytes(&b"Content-Type"[..], &b"text/event-stream"[..])
                                .unwrap(),
                        )
                }
                Some(reply) => Response::from_string(reply.to_string())
                    .with_header(
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
                    )
                    .with_header(Header::from_bytes(&b"Mcp-Session-Id"[..], &b"sess-1"[..]).unwrap()),
            };
            let _ = request.respond(response);
        }
    });

    (format!("http://127.0.0.1:{port}/mcp"), seen)
}

#[test]
fn streamable_http_session_lifecycle() {
    let (url, seen) = streamable_server();
    let config = ToolsConfig {
        url,
        transport: McpTransportKind::StreamableHttp,
        call_timeout_ms: 5000,
    };

    let mut client = McpClient::connect(&config).unwrap();
    assert!(client.is_connected());
    assert_eq!(client.server_info().unwrap().name, "EnergyDatabase");
    let names: Vec<_> = client.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["get_recent_logs", "get_top_offending_devices"]);

    let text = client
        .execute_tool("get_recent_logs", json!({"limit": 5}))
        .unwrap();
    assert_eq!(text, "Kitchen: lights on, nobody present");

    let err = client
        .execute_tool("get_top_offending_devices", json!({}))
        .unwrap_err();
    assert!(err.to_string().contains("unknown tool"), "{err:#}");

    client.close();
    client.close();
    assert!(!client.is_connected());

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.methods,
        [
            "initialize",
            "notifications/initialized",
            "tools/list",
            "tools/call",
            "tools/call"
        ]
    );
    // The session id is echoed on every request after initialize.
    assert_eq!(seen.session_headers[0], None);
    assert!(
        seen.session_headers[1..]
            .iter()
            .all(|s| s.as_deref() == Some("sess-1"))
    );
    assert!(seen.deleted);
}

#[test]
fn unreachable_tool_server_fails_connect() {
    let config = ToolsConfig {
        url: "http://127.0.0.1:1/mcp".to_string(),
        transport: McpTransportKind::StreamableHttp,
        call_timeout_ms: 1000,
    };
    assert!(McpClient::connect(&config).is_err());
}

// ---------------------------------------------------------------------------
// Legacy HTTP+SSE
// ---------------------------------------------------------------------------

/// Read one HTTP request: request line, headers, and a `Content-Length` body.
fn read_request(stream: &TcpStream) -> (String, String) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            length = value.trim().parse().unwrap();
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).unwrap();
    (request_line, String::from_utf8(body).unwrap())
}

/// Returns the stream URL and a receiver that fires once the client has
/// dropped the event stream.
fn sse_server() -> (String, Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (closed_tx, closed) = mpsc::channel();

    thread::spawn(move || {
        let mut incoming = listener.incoming();

        // First connection: the event stream.
        let mut events = incoming.next().unwrap().unwrap();
        let (request_line, _) = read_request(&events);
        assert!(request_line.starts_with("GET /lou/mcp/sse"));
        events
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n\
                  event: endpoint\ndata: /lou/mcp/messages/?session_id=abc\n\n",
            )
            .unwrap();
        events.flush().unwrap();

        let mut watch = events.try_clone().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 64];
            while matches!(watch.read(&mut buf), Ok(n) if n > 0) {}
            let _ = closed_tx.send(());
        });

        // Every later connection is a POST whose reply goes out on the stream.
        for stream in incoming {
            let mut stream = stream.unwrap();
            let (request_line, body) = read_request(&stream);
            assert!(request_line.starts_with("POST /lou/mcp/messages/?session_id=abc"));
            stream
                .write_all(
                    b"HTTP/1.1 202 Accepted\r\nContent-Length: 8\r\nConnection: close\r\n\r\nAccepted",
                )
                .unwrap();
            let message: Value = serde_json::from_str(&body).unwrap();
            if let Some(reply) = rpc_reply(&message) {
                let event = format!("event: message\ndata: {reply}\n\n");
                if events.write_all(event.as_bytes()).is_err() {
                    return;
                }
                events.flush().unwrap();
            }
        }
    });

    (format!("http://127.0.0.1:{port}/lou/mcp/sse"), closed)
}

#[test]
fn legacy_sse_transport_round_trip() {
    let (url, stream_closed) = sse_server();
    let config = ToolsConfig {
        url,
        transport: McpTransportKind::Sse,
        call_timeout_ms: 5000,
    };

    let mut client = McpClient::connect(&config).unwrap();
    assert_eq!(client.tools().len(), 2);
    assert_eq!(
        client.tools()[0].description.as_deref(),
        Some("Latest detections")
    );

    let text = client.execute_tool("get_recent_logs", Value::Null).unwrap();
    assert!(text.starts_with("Kitchen"));
    assert!(stream_closed.try_recv().is_err());

    client.close();
    assert!(
        stream_closed.recv_timeout(Duration::from_secs(5)).is_ok(),
        "event stream still open after close"
    );
}
