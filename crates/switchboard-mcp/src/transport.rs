//! Stdio transport plumbing: process spawn, environment synthesis, and
//! Content-Length framing.
//!
//! MCP over stdio frames every message as
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", ...}
//! ```
//!
//! The framing codec here is shared by the read loop and the writer half of
//! [`StdioConnection`](crate::stdio::StdioConnection).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{McpError, Result};

/// A spawned MCP server child process with piped stdio.
pub struct StdioProcess {
    /// The child process handle.
    pub child: Child,
    /// Writer half (child stdin).
    pub stdin: ChildStdin,
    /// Buffered reader half (child stdout).
    pub stdout: BufReader<ChildStdout>,
}

/// Resolve the effective working directory for a stdio server.
pub fn resolve_cwd(configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Synthesize the child environment.
///
/// Union-merges the host process environment with the configured variables
/// (config wins), then prefixes `PATH` with `<cwd>/node_modules/.bin` so
/// locally installed launchers resolve without an absolute command path.
pub fn build_child_env(configured: &HashMap<String, String>, cwd: &Path) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in configured {
        env.insert(key.clone(), value.clone());
    }

    let local_bin = cwd.join("node_modules").join(".bin");
    let path_key = "PATH".to_string();
    let existing = env.get(&path_key).cloned().unwrap_or_default();
    let prefixed = if existing.is_empty() {
        local_bin.display().to_string()
    } else {
        format!(
            "{}{}{}",
            local_bin.display(),
            path_separator(),
            existing
        )
    };
    env.insert(path_key, prefixed);

    env
}

fn path_separator() -> char {
    if cfg!(windows) { ';' } else { ':' }
}

/// Spawn an MCP server child process with piped stdin/stdout.
///
/// Stderr is inherited so server diagnostics land in the host's stderr.
pub fn spawn_stdio(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    cwd: &Path,
) -> Result<StdioProcess> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| McpError::spawn_failed(format!("failed to spawn '{command}': {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

    Ok(StdioProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    })
}

/// Write one Content-Length framed message.
pub async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", json.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    tracing::trace!(content_length = json.len(), "sent MCP frame");
    Ok(())
}

/// Read one Content-Length framed message.
///
/// Returns `None` on clean EOF before any header byte.
pub async fn read_frame(reader: &mut BufReader<ChildStdout>) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            if saw_header {
                return Err(McpError::protocol("EOF in the middle of a frame header"));
            }
            return Ok(None);
        }
        saw_header = true;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }

        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(
                len_str
                    .trim()
                    .parse()
                    .map_err(|e| McpError::protocol(format!("invalid Content-Length: {e}")))?,
            );
        }
    }

    let content_length =
        content_length.ok_or_else(|| McpError::protocol("missing Content-Length header"))?;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let json_str = String::from_utf8(body)
        .map_err(|e| McpError::protocol(format!("invalid UTF-8 in frame: {e}")))?;

    tracing::trace!(content_length, "received MCP frame");

    Ok(Some(serde_json::from_str(&json_str)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cwd_prefers_configured() {
        let configured = PathBuf::from("/srv/project");
        assert_eq!(resolve_cwd(Some(&configured)), configured);
    }

    #[test]
    fn test_resolve_cwd_falls_back_to_process_dir() {
        let resolved = resolve_cwd(None);
        assert!(resolved.is_absolute() || resolved == PathBuf::from("."));
    }

    #[test]
    fn test_build_child_env_merges_config_over_process() {
        // SAFETY: test-only mutation, no concurrent env readers in this test binary.
        unsafe { std::env::set_var("SWITCHBOARD_TEST_MARKER", "from-process") };

        let mut configured = HashMap::new();
        configured.insert("SWITCHBOARD_TEST_MARKER".to_string(), "from-config".to_string());
        configured.insert("EXTRA".to_string(), "1".to_string());

        let env = build_child_env(&configured, Path::new("/srv/app"));
        assert_eq!(
            env.get("SWITCHBOARD_TEST_MARKER").map(String::as_str),
            Some("from-config")
        );
        assert_eq!(env.get("EXTRA").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_build_child_env_prefixes_local_bin() {
        let env = build_child_env(&HashMap::new(), Path::new("/srv/app"));
        let path = env.get("PATH").expect("PATH present");
        assert!(path.starts_with("/srv/app/node_modules/.bin"));
    }

    #[test]
    fn test_spawn_nonexistent_command() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let result = spawn_stdio(
            "nonexistent-mcp-server-12345",
            &[],
            &HashMap::new(),
            Path::new("."),
        );
        assert!(matches!(result, Err(McpError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_frame_round_trip_through_cat() {
        if !cfg!(unix) {
            return;
        }

        let mut process =
            spawn_stdio("cat", &[], &build_child_env(&HashMap::new(), Path::new(".")), Path::new("."))
                .unwrap();

        let message = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        write_frame(&mut process.stdin, &message).await.unwrap();

        let echoed = read_frame(&mut process.stdout).await.unwrap().unwrap();
        assert_eq!(echoed, message);

        drop(process.stdin);
        let _ = process.child.wait().await;
    }
}
