//! HTTP route handlers.

pub mod mcp;
pub mod views;
pub mod ws;

pub use mcp::{
    LAST_EVENT_ID_HEADER, SESSION_HEADER, delete_mcp, get_mcp, post_mcp, post_sampling_error,
    post_sampling_response,
};
pub use views::{
    get_prompts, get_resources, get_roots, get_servers, get_status, get_templates, get_tools,
    post_roots, suggest_prompt, suggest_resource, suggest_tool,
};
pub use ws::{ServerMessage, ws_handler};
