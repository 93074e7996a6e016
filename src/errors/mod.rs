mod api_error;
mod mcp_error;
mod query_error;
mod tool_error;

pub use api_error::ApiError;
pub use mcp_error::{ErrorCode, McpError};
pub use query_error::QueryError;
pub use tool_error::{ToolError, ToolErrorKind};
