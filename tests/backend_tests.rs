/// Integration tests for the backend REST client against a `tiny_http` mock
/// that mirrors the backend's notification store.
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tiny_http::{Header, Method, Response, Server};

use voltguard::backend::BackendClient;
use voltguard::notifications::{Level, Timestamp};

fn json_response(value: Value) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(value.to_string())
        .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap())
}

fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.replace('+', " ").replace("%20", " "))
    })
}

/// Returns the base URL and the mock's stored notifications.
fn mock_backend() -> (String, Arc<Mutex<Vec<Value>>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let store = Arc::new(Mutex::new(Vec::new()));
    let notes = Arc::clone(&store);

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let url = request.url().to_string();
            let path = url.split('?').next().unwrap_or_default().to_string();
            let response = match (request.method(), path.as_str()) {
                (Method::Get, "/api/stats") => json_response(json!({"lights_on": 3, "lights_off": 5})),
                (Method::Get, "/api/notifications") => {
                    let limit: usize = query_param(&url, "limit")
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(50);
                    let notes = notes.lock().unwrap();
                    let recent: Vec<_> = notes.iter().rev().take(limit).cloned().collect();
                    json_response(Value::Array(recent))
                }
                (Method::Post, "/api/notifications/send") => {
                    match query_param(&url, "message") {
                        Some(message) => {
                            let device = query_param(&url, "device").unwrap_or_else(|| "System".into());
                            let mut notes = notes.lock().unwrap();
                            let note = json!({
                                "id": format!("notif_{}_{}", notes.len(), device),
                                "message": message,
                                "device": device,
                                "level": query_param(&url, "level").unwrap_or_else(|| "info".into()),
                                "timestamp": "2025-03-01T10:00:00",
                                "read": false
                            });
                            notes.push(note.clone());
                            json_response(json!({"status": "sent", "notification": note}))
                        }
                        None => json_response(json!({"error": "message is required"})),
                    }
                }
                (Method::Delete, "/api/notifications") => {
                    notes.lock().unwrap().clear();
                    json_response(json!({"status": "cleared"}))
                }
                _ => Response::from_string("not found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    (format!("http://127.0.0.1:{port}/"), store)
}

#[test]
fn notification_store_round_trip() {
    let (url, store) = mock_backend();
    let client = BackendClient::new(&url, Duration::from_secs(5));

    let sent = client
        .send_notification("Lights left on", Some("Kitchen"), Level::Warning)
        .unwrap();
    assert_eq!(sent.level, Level::Warning);
    assert_eq!(sent.device.as_deref(), Some("Kitchen"));
    assert!(matches!(sent.timestamp, Timestamp::Text(_)));

    client
        .send_notification("Backup finished", None, Level::Info)
        .unwrap();

    let recent = client.recent_notifications(1).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].message, "Backup finished");
    assert_eq!(store.lock().unwrap().len(), 2);

    client.clear_notifications().unwrap();
    assert!(client.recent_notifications(10).unwrap().is_empty());
}

#[test]
fn stats_decode() {
    let (url, _) = mock_backend();
    let stats = BackendClient::new(&url, Duration::from_secs(5)).stats().unwrap();
    assert_eq!(stats.lights_on, 3);
    assert_eq!(stats.lights_off, 5);
}

#[test]
fn unreachable_backend_errors() {
    let client = BackendClient::new("http://127.0.0.1:1", Duration::from_millis(500));
    assert!(client.recent_notifications(5).is_err());
    assert!(client.stats().is_err());
}
