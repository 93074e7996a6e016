use crate::constants::resources::HINTS_URI;
use crate::errors::ToolError;
use crate::services::registry::{ToolDescriptor, ToolMode};
use crate::services::tool_executor::{ToolContext, ToolHandler};
use serde_json::Value;

pub struct GetNameOfJobsRecentTable;

impl GetNameOfJobsRecentTable {
    pub const NAME: &'static str = "GetNameOfJobsRecentTable";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Gets the schema full name of the table that stores the jobs information",
            &[ToolMode::ForSelf],
        )
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetNameOfJobsRecentTable {
    async fn handle(&self, ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        Ok(serde_json::json!({ "name": ctx.settings.jobs_table() }))
    }
}

pub struct GetUsefulSystemTableNames;

impl GetUsefulSystemTableNames {
    pub const NAME: &'static str = "GetUsefulSystemTableNames";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Gets the names of system tables in the dremio cluster, useful for various analysis.\n\
             Use the GetSchemaOfTable tool to get the schema of the table",
            &[ToolMode::ForSelf, ToolMode::ForDataPatterns],
        )
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetUsefulSystemTableNames {
    async fn handle(&self, _ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        Ok(serde_json::json!([{
            "table_name": "information_schema.\"tables\"",
            "description": "Information about tables in this cluster. \
                Be sure to filter out SYSTEM_TABLE for looking at user tables. \
                You must encapsulate TABLES in double quotes.",
        }]))
    }
}

const HINTS_TEXT: &str = "Dremio cluster has few key dimensions that can be used to analyze and optimize the cluster. \
Looking at the number of jobs and its statistics and failure rates, and overall system usage";

pub struct Hints;

impl Hints {
    pub const NAME: &'static str = "Hints";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::resource(Self::NAME, HINTS_URI, HINTS_TEXT, &[ToolMode::ForSelf])
    }
}

#[async_trait::async_trait]
impl ToolHandler for Hints {
    async fn handle(&self, _ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        Ok(Value::String(HINTS_TEXT.to_string()))
    }
}
