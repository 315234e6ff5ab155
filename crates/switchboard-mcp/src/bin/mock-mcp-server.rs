//! Mock MCP server for integration testing.
//!
//! A minimal stdio MCP server speaking Content-Length framed JSON-RPC.
//! Supports initialize, listings, tools/call, resources/read, prompts/get,
//! and resource subscriptions.
//!
//! Usage:
//!   mock-mcp-server [--delay-ms N]
//!
//! Options:
//!   --delay-ms N    Add N ms delay to all responses

use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

fn main() {
    let delay_ms = parse_delay(&env::args().collect::<Vec<_>>());
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());

    while let Some(message) = read_frame(&mut reader) {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            continue;
        };

        // Notifications need no response.
        let Some(id) = message.get("id").cloned() else {
            continue;
        };

        if delay_ms > 0 {
            thread::sleep(Duration::from_millis(delay_ms));
        }

        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let response = match handle(method, &params) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, msg)) => {
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": msg}})
            }
        };

        write_frame(&mut stdout, &response);
    }
}

fn parse_delay(args: &[String]) -> u64 {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--delay-ms" {
            return iter.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        }
    }
    0
}

fn handle(method: &str, params: &Value) -> Result<Value, (i64, String)> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {
                "tools": {"listChanged": true},
                "resources": {"subscribe": true, "listChanged": true, "templates": true},
                "prompts": {"listChanged": true}
            },
            "serverInfo": {"name": "mock-mcp-server", "version": "1.0.0"}
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({
            "tools": [
                {
                    "name": "echo",
                    "description": "Echo back the input",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                        "required": ["text"]
                    }
                },
                {
                    "name": "add",
                    "description": "Add two numbers",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                        "required": ["a", "b"]
                    }
                }
            ]
        })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or(json!({}));
            match name {
                "echo" => {
                    let text = args.get("text").and_then(Value::as_str).unwrap_or("");
                    Ok(json!({"content": [{"type": "text", "text": text}]}))
                }
                "add" => {
                    let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
                    let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
                    Ok(json!({"content": [{"type": "text", "text": (a + b).to_string()}]}))
                }
                other => Err((-32602, format!("unknown tool: {other}"))),
            }
        }
        "resources/list" => Ok(json!({
            "resources": [
                {"uri": "mock://greeting.txt", "name": "greeting", "mimeType": "text/plain"}
            ]
        })),
        "resources/read" => {
            let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
            if uri == "mock://greeting.txt" {
                Ok(json!({"contents": [{"uri": uri, "text": "hello from the mock server"}]}))
            } else {
                Err((-32602, format!("unknown resource: {uri}")))
            }
        }
        "resources/templates/list" => Ok(json!({
            "resourceTemplates": [
                {"name": "item", "uriTemplate": "mock://items/{id}"}
            ]
        })),
        "resources/subscribe" | "resources/unsubscribe" => Ok(json!({})),
        "prompts/list" => Ok(json!({
            "prompts": [
                {"name": "summarize", "description": "Summarize a document"}
            ]
        })),
        "prompts/get" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            Ok(json!({
                "messages": [
                    {"role": "user", "content": {"type": "text", "text": format!("run prompt {name}")}}
                ]
            }))
        }
        other => Err((-32601, format!("method not found: {other}"))),
    }
}

fn read_frame(reader: &mut impl BufRead) -> Option<Value> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).ok()?;
        if bytes_read == 0 {
            return None;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(len) = trimmed.strip_prefix("Content-Length:") {
            content_length = len.trim().parse().ok();
        }
    }

    let mut body = vec![0u8; content_length?];
    reader.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

fn write_frame(writer: &mut impl Write, message: &Value) {
    let json = message.to_string();
    let _ = write!(writer, "Content-Length: {}\r\n\r\n{}", json.len(), json);
    let _ = writer.flush();
}
