use std::process::{Command, Stdio};
use std::io::{Write, BufRead, BufReader};
use std::sync::mpsc::{channel, Sender, Receiver};
use std::thread;
use std::time::Duration;
use serde_json::{json, Value};

/// Helper struct to manage server process with async I/O
struct McpClient {
    child: std::process::Child,
    tx: Sender<Value>,
    rx: Receiver<Value>,
}

impl McpClient {
    /// Spawn the server with every backend pointed at a closed local port.
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_matjip"))
            .env("MATJIP_EMBEDDING__API_KEY", "test-key")
            .env("MATJIP_EMBEDDING__BASE_URL", "http://127.0.0.1:9")
            .env("MATJIP_STORE__URL", "http://127.0.0.1:9")
            .env("MATJIP_STORE__TIMEOUT_SECS", "2")
            .env("MATJIP_RETRY__MAX_ATTEMPTS", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())  // Suppress log output in tests
            .spawn()
            .expect("Failed to spawn matjip binary");

        let mut stdin = child.stdin.take().expect("Failed to get stdin");
        let stdout = child.stdout.take().expect("Failed to get stdout");

        // Channel for sending requests
        let (req_tx, req_rx) = channel::<Value>();

        // Channel for receiving responses
        let (resp_tx, resp_rx) = channel::<Value>();

        // Thread to write requests to stdin
        thread::spawn(move || {
            while let Ok(request) = req_rx.recv() {
                let request_str = serde_json::to_string(&request).expect("Failed to serialize");
                if writeln!(stdin, "{}", request_str).is_err() {
                    break;
                }
                if stdin.flush().is_err() {
                    break;
                }
            }
        });

        // Thread to read responses from stdout
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&line) {
                            if resp_tx.send(value).is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        McpClient {
            child,
            tx: req_tx,
            rx: resp_rx,
        }
    }

    fn send_request(&self, request: Value) -> Option<Value> {
        self.send_request_with_timeout(request, Duration::from_secs(2))
    }

    fn send_request_with_timeout(&self, request: Value, timeout: Duration) -> Option<Value> {
        self.tx.send(request).ok()?;
        self.rx.recv_timeout(timeout).ok()
    }

    fn send_notification(&self, notification: Value) {
        let _ = self.tx.send(notification);
        // Notifications don't have responses, give server time to process
        thread::sleep(Duration::from_millis(50));
    }

    fn initialize(&self) {
        let initialize_request = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "id": 1,
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }
        });
        self.send_request(initialize_request)
            .expect("Failed to initialize");

        self.send_notification(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }));
    }

    fn call_tool(&self, id: u64, name: &str, arguments: Value) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": id,
            "params": {
                "name": name,
                "arguments": arguments
            }
        });
        self.send_request_with_timeout(request, Duration::from_secs(15))
            .unwrap_or_else(|| panic!("Failed to get {} response", name))
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn test_initialize_handshake() {
    let client = McpClient::spawn();

    // Send initialize request
    let initialize_request = json!({
        "jsonrpc": "2.0",
        "method": "initialize",
        "id": 1,
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    });

    let response = client.send_request(initialize_request)
        .expect("Failed to get initialize response");

    // Verify response structure
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert!(response["result"].is_object());

    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert!(result["capabilities"]["tools"].is_object());
    assert_eq!(result["serverInfo"]["name"], "matjip");
    assert!(result["serverInfo"]["version"].is_string());
    assert!(result["serverInfo"]["description"].is_string());

    client.send_notification(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }));
}

#[test]
fn test_tool_discovery() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.send_request(json!({
        "jsonrpc": "2.0",
        "method": "tools/list",
        "id": 2
    }))
    .expect("Failed to get tools/list response");

    assert_eq!(response["id"], 2);
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2, "Should have exactly 2 tools");

    let tool_names: Vec<&str> = tools.iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(tool_names.contains(&"search_restaurants"));
    assert!(tool_names.contains(&"health_check"));

    for tool in tools {
        assert!(tool["description"].is_string());
        assert!(tool["inputSchema"].is_object());
    }

    let search = tools.iter().find(|t| t["name"] == "search_restaurants").unwrap();
    let properties = &search["inputSchema"]["properties"];
    for field in ["intent", "entities", "negation_entities", "suggested_queries"] {
        assert!(properties[field].is_object(), "inputSchema should describe {}", field);
    }
}

#[test]
fn test_health_check() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "health_check", json!({}));

    let result = &response["result"];
    assert!(result["isError"].is_null() || result["isError"] == false);
    let content = &result["structuredContent"];
    assert_eq!(content["status"], "ok");
    assert!(content["version"].is_string());
    assert_eq!(content["rrf_k"], 60.0);
    assert_eq!(content["negation_policy"], "ignore");
}

#[test]
fn test_search_with_unreachable_backends_returns_empty() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "search_restaurants", json!({
        "intent": "search",
        "entities": {
            "location": ["강남역"],
            "category": ["일식"],
            "convenience": ["주차"]
        },
        "negation_entities": {},
        "suggested_queries": ["강남역 주차 가능한 일식집"]
    }));

    assert_eq!(response["id"], 2);
    let result = &response["result"];
    assert!(result["isError"].is_null() || result["isError"] == false);

    let content = &result["structuredContent"];
    assert_eq!(content["count"], 0);
    assert_eq!(content["results"], json!([]));
    assert_eq!(content["intent"], "search");
    assert_eq!(content["stats"]["sub_queries"], 1);
    assert_eq!(content["stats"]["keyword_hits"], 0);
    assert_eq!(content["stats"]["vector_hits"], 0);
}

#[test]
fn test_search_unknown_intent_is_lenient() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "search_restaurants", json!({
        "intent": "recommend",
        "suggested_queries": ["회식하기 좋은 곳"]
    }));

    let result = &response["result"];
    assert!(result["isError"].is_null() || result["isError"] == false);
    assert_eq!(result["structuredContent"]["intent"], "search");
}

#[test]
fn test_search_requires_sub_queries() {
    let client = McpClient::spawn();
    client.initialize();

    let response = client.call_tool(2, "search_restaurants", json!({
        "intent": "compare",
        "entities": {"title": ["스시히로바"]},
        "suggested_queries": []
    }));

    let result = &response["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["field"], "suggested_queries");
}
