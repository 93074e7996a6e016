use crate::errors::{ToolError, ToolErrorKind};
use crate::services::registry::{ToolDescriptor, ToolMode};
use crate::services::tool_executor::{ToolContext, ToolHandler};
use crate::utils::dataset_path::{quote_dataset_path, split_dataset_path};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(_)) => true,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn collaboration_field(ctx: &ToolContext, id: &str, kind: &str, field: &str) -> Value {
    match ctx.dremio.collaboration(id, kind).await {
        Ok(body) => body.get(field).cloned().unwrap_or(Value::Null),
        Err(err) => {
            ctx.logger.debug(
                "no collaboration data",
                Some(&serde_json::json!({ "id": id, "kind": kind, "error": err.to_string() })),
            );
            Value::Null
        }
    }
}

/// Catalog entity by path, with `tags` and `description` taken from the
/// collaboration endpoints. Missing tags or wiki are not an error.
pub async fn describe_entity(ctx: &ToolContext, path: &[String]) -> Result<Value, ToolError> {
    let mut entity = ctx.dremio.catalog_by_path(path).await?;
    let id = entity.get("id").and_then(|v| v.as_str()).map(str::to_string);
    if let (Some(id), Value::Object(map)) = (id, &mut entity) {
        let (tags, wiki) = futures::future::join(
            collaboration_field(ctx, &id, "tag", "tags"),
            collaboration_field(ctx, &id, "wiki", "text"),
        )
        .await;
        map.insert("tags".to_string(), tags);
        map.insert("description".to_string(), wiki);
    }
    Ok(entity)
}

/// Renders a catalog entity as flat strings: dotted path, one
/// `name: type` line per field, comma-joined tags. The view SQL is dropped.
fn flatten_entity(entity: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in entity {
        let rendered = match (key.as_str(), value) {
            ("sql", _) => continue,
            ("path", Value::Array(_)) => string_list(value).join("."),
            ("fields", Value::Array(fields)) => fields
                .iter()
                .filter_map(|field| field.as_object())
                .map(|field| {
                    let name = field.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
                    let type_name = match field.get("type") {
                        Some(Value::Object(t)) => t
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string(),
                        Some(Value::String(t)) => t.clone(),
                        Some(other) => other.to_string(),
                        None => "unknown".to_string(),
                    };
                    format!("{}: {}", name, type_name)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            ("tags", Value::Array(_)) => string_list(value).join(", "),
            (_, Value::Null) => String::new(),
            (_, Value::String(text)) => text.clone(),
            (_, other) => other.to_string(),
        };
        flat.insert(key.clone(), Value::String(rendered));
    }
    flat
}

fn table_name_arg(args: &Value, key: &str) -> Result<String, ToolError> {
    match args.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ToolError::invalid_params(format!("{} must be a non-empty string", key))),
    }
}

pub struct GetSchemaOfTable;

impl GetSchemaOfTable {
    pub const NAME: &'static str = "GetSchemaOfTable";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Gets the schema of the given table.\n\
             Returns a list containing a dictionary with information about the table. \
             The field \"fields\" lists column names and types. Optionally \"description\" and \"tags\" \
             provide more information about the table",
            &[ToolMode::ForSelf, ToolMode::ForDataPatterns],
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "table_name": {"type": "string", "description": "name of the table, including the schema"}
            },
            "required": ["table_name"]
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetSchemaOfTable {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let table_name = table_name_arg(&args, "table_name")?;
        let entity = describe_entity(ctx, &split_dataset_path(&table_name)).await?;
        match entity.as_object() {
            Some(map) if !map.is_empty() => {
                Ok(Value::Array(vec![Value::Object(flatten_entity(map))]))
            }
            _ => Ok(Value::Array(Vec::new())),
        }
    }
}

pub struct GetTableOrViewLineage;

impl GetTableOrViewLineage {
    pub const NAME: &'static str = "GetTableOrViewLineage";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Finds the lineage of a table or view in the Dremio cluster. \
             Returns a json representation with the sources, parents and children of the table or view.",
            &[ToolMode::ForSelf, ToolMode::ForDataPatterns],
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "table_name": {
                    "type": "string",
                    "description": "name of the table or view, including the schema. Be sure to quote the table name if it contains special characters"
                }
            },
            "required": ["table_name"]
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetTableOrViewLineage {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let table_name = table_name_arg(&args, "table_name")?;
        // dotted names are paths, anything else is already a catalog id
        let id = if table_name.contains('.') {
            let entity = ctx.dremio.catalog_by_path(&split_dataset_path(&table_name)).await?;
            entity
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ToolError::not_found(format!("{} has no catalog id", table_name)))?
        } else {
            table_name
        };
        Ok(ctx.dremio.lineage(&id).await?)
    }
}

/// The `description`/`tags` pair of an entity, when either is set.
fn extract_description(entity: &Value) -> Option<Value> {
    let description = entity.get("description");
    let tags = entity.get("tags");
    if !is_truthy(description) && !is_truthy(tags) {
        return None;
    }
    let mut picked = Map::new();
    if let Some(description) = description {
        picked.insert("description".to_string(), description.clone());
    }
    if let Some(tags) = tags {
        picked.insert("tags".to_string(), tags.clone());
    }
    Some(Value::Object(picked))
}

fn entity_path(entity: &Value) -> Option<Vec<String>> {
    entity.get("path").filter(|v| v.is_array()).map(string_list)
}

/// Every proper prefix of `path`: `a.b.c` yields `a` and `a.b`.
fn parent_prefixes(path: &[String]) -> Vec<Vec<String>> {
    (1..path.len()).map(|len| path[..len].to_vec()).collect()
}

pub struct GetDescriptionOfTableOrSchema;

impl GetDescriptionOfTableOrSchema {
    pub const NAME: &'static str = "GetDescriptionOfTableOrSchema";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Given one or more table names or schema names, this will return the description of the table or schema, \
             if any exists, as well as the description of any parent schemas.\n\
             Returns a dictionary keyed by each part of the name's hierarchy with the description and tags.",
            &[ToolMode::ForSelf, ToolMode::ForDataPatterns],
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "description": "The name of the table or schema or a list of names of tables or schemas",
                    "anyOf": [
                        {"type": "string"},
                        {"type": "array", "items": {"type": "string"}}
                    ]
                }
            },
            "required": ["name"]
        }))
    }

    fn names(args: &Value) -> Result<Vec<Vec<String>>, ToolError> {
        let raw: Vec<String> = match args.get("name") {
            Some(Value::String(name)) => vec![name.clone()],
            Some(Value::Array(_)) => string_list(&args["name"]),
            _ => Vec::new(),
        };
        let paths: Vec<Vec<String>> = raw
            .iter()
            .map(|name| split_dataset_path(name))
            .filter(|path| !path.is_empty())
            .collect();
        if paths.is_empty() {
            return Err(ToolError::invalid_params("name must name at least one table or schema"));
        }
        Ok(paths)
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetDescriptionOfTableOrSchema {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let mut pending = Self::names(&args)?;
        let mut seen: BTreeSet<Vec<String>> = pending.iter().cloned().collect();
        let mut requested = true;
        let mut result = Map::new();
        let executor = ctx.fan_out();

        while !pending.is_empty() {
            let lookups = pending.iter().map(|path| async move {
                match describe_entity(ctx, path).await {
                    Ok(entity) => Ok(Some(entity)),
                    // a parent the caller cannot see is skipped
                    Err(err) if !requested && err.kind == ToolErrorKind::NotFound => Ok(None),
                    Err(err) => Err(err),
                }
            });
            let entities = executor.run(lookups).await?;

            let mut parents = BTreeSet::new();
            for entity in entities.iter().flatten() {
                let path = entity_path(entity);
                if let Some(description) = extract_description(entity) {
                    let key = match &path {
                        Some(path) => quote_dataset_path(path),
                        None => entity
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    };
                    result.insert(key, description);
                }
                if let Some(path) = path {
                    parents.extend(parent_prefixes(&path));
                }
            }

            pending = parents.into_iter().filter(|path| seen.insert(path.clone())).collect();
            requested = false;
        }
        Ok(Value::Object(result))
    }
}
