use crate::constants::reports::SEARCH_PAGE_SIZE;
use crate::errors::ToolError;
use crate::services::registry::{ToolDescriptor, ToolMode};
use crate::services::tool_executor::{ToolContext, ToolHandler};
use serde::Deserialize;
use serde_json::Value;

const CATEGORIES: &[&str] = &[
    "JOB", "VIEW", "TABLE", "FOLDER", "UDF", "SPACE", "REFLECTION", "SCRIPT", "SOURCE",
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    more_info: Option<String>,
}

fn category_filter(category: Option<&str>) -> Result<Option<String>, ToolError> {
    let Some(raw) = category.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let upper = raw.to_uppercase();
    if !CATEGORIES.contains(&upper.as_str()) {
        return Err(ToolError::invalid_params(format!("Unknown search category: {}", raw))
            .with_hint(format!("Use one of: {}", CATEGORIES.join(", "))));
    }
    Ok(Some(format!("category in [\"{}\"]", upper)))
}

fn search_body(query: &str, filter: Option<&str>, page_token: Option<&str>) -> Value {
    let mut body = serde_json::json!({
        "query": query,
        "maxResults": SEARCH_PAGE_SIZE,
    });
    if let Some(filter) = filter {
        body["filter"] = Value::String(filter.to_string());
    }
    if let Some(token) = page_token {
        body["pageToken"] = Value::String(token.to_string());
    }
    body
}

pub struct SemanticSearch;

impl SemanticSearch {
    pub const NAME: &'static str = "SemanticSearch";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Runs a semantic search on the Dremio cluster using the given query. \
             Returns a json representation with the results of the search",
            &[ToolMode::ForSelf, ToolMode::ForDataPatterns, ToolMode::Experimental],
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The query to run"},
                "category": {
                    "type": "string",
                    "description": "Optionally a category to search for. One of TABLE, VIEW, JOB, SOURCE, FOLDER. Search all categories if unspecified"
                }
            },
            "required": ["query"]
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for SemanticSearch {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let filter = category_filter(args.get("category").and_then(|v| v.as_str()))?;

        let mut results = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = search_body(query, filter.as_deref(), page_token.as_deref());
            let raw = ctx.dremio.search(&body).await?;
            let page: SearchPage = serde_json::from_value(raw)
                .map_err(|err| {
                    ToolError::upstream(format!("unexpected search response: {}", err))
                })?;
            if page.results.is_empty() || page.error_message.is_some() || page.more_info.is_some() {
                if let Some(error) = page.error_message {
                    ctx.logger.warn("search stopped", Some(&serde_json::json!({ "error": error })));
                }
                break;
            }
            results.extend(page.results);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(serde_json::json!({ "results": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_becomes_filter_expression() {
        assert_eq!(
            category_filter(Some("table")).expect("filter").as_deref(),
            Some("category in [\"TABLE\"]")
        );
        assert_eq!(category_filter(None).expect("filter"), None);
        assert_eq!(category_filter(Some(" ")).expect("filter"), None);
        assert!(category_filter(Some("dashboard")).is_err());
    }

    #[test]
    fn body_carries_paging_token_only_when_present() {
        let first = search_body("revenue", None, None);
        assert_eq!(first, serde_json::json!({"query": "revenue", "maxResults": 50}));
        let next = search_body("revenue", Some("category in [\"VIEW\"]"), Some("tok"));
        assert_eq!(next["pageToken"], "tok");
        assert_eq!(next["filter"], "category in [\"VIEW\"]");
    }
}
