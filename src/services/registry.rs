use crate::errors::ToolError;
use crate::services::settings::Settings;
use crate::services::tool_executor::ToolHandler;
use jsonschema::JSONSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolMode {
    ForSelf,
    ForPrometheus,
    ForDataPatterns,
    Experimental,
}

impl ToolMode {
    pub const ALL: [ToolMode; 4] = [
        ToolMode::ForSelf,
        ToolMode::ForPrometheus,
        ToolMode::ForDataPatterns,
        ToolMode::Experimental,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolMode::ForSelf => "FOR_SELF",
            ToolMode::ForPrometheus => "FOR_PROMETHEUS",
            ToolMode::ForDataPatterns => "FOR_DATA_PATTERNS",
            ToolMode::Experimental => "EXPERIMENTAL",
        }
    }

    /// Legacy integer flag value, kept for configs written as bitmasks.
    pub fn bit(self) -> u32 {
        match self {
            ToolMode::ForSelf => 1,
            ToolMode::ForPrometheus => 2,
            ToolMode::ForDataPatterns => 4,
            ToolMode::Experimental => 8,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase().replace('-', "_");
        ToolMode::ALL
            .into_iter()
            .find(|mode| mode.name() == normalized)
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of capability groups. Used both for a tool's own mask and for the
/// runtime's active modes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeSet(BTreeSet<ToolMode>);

impl ModeSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of(modes: &[ToolMode]) -> Self {
        Self(modes.iter().copied().collect())
    }

    pub fn from_bits(bits: u32) -> Result<Self, String> {
        let known = ToolMode::ALL.iter().fold(0, |acc, mode| acc | mode.bit());
        if bits & !known != 0 {
            return Err(format!("unknown tool mode bits in {}", bits));
        }
        Ok(Self(
            ToolMode::ALL
                .into_iter()
                .filter(|mode| bits & mode.bit() != 0)
                .collect(),
        ))
    }

    pub fn bits(&self) -> u32 {
        self.0.iter().fold(0, |acc, mode| acc | mode.bit())
    }

    pub fn contains(&self, mode: ToolMode) -> bool {
        self.0.contains(&mode)
    }

    pub fn insert(&mut self, mode: ToolMode) {
        self.0.insert(mode);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn union(&self, other: &ModeSet) -> ModeSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn intersection(&self, other: &ModeSet) -> ModeSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    pub fn intersects(&self, other: &ModeSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = ToolMode> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ToolMode> for ModeSet {
    fn from_iter<T: IntoIterator<Item = ToolMode>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for ModeSet {
    type Err = String;

    /// Accepts `FOR_SELF,FOR_DATA_PATTERNS` style lists or a legacy bitmask.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if let Ok(bits) = trimmed.parse::<u32>() {
            return ModeSet::from_bits(bits);
        }
        let mut set = ModeSet::empty();
        for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mode = ToolMode::parse(part).ok_or_else(|| {
                let known: Vec<&str> = ToolMode::ALL.iter().map(|m| m.name()).collect();
                format!("unknown tool mode '{}', expected one of {}", part, known.join(", "))
            })?;
            set.insert(mode);
        }
        Ok(set)
    }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ToolMode::name).collect();
        f.write_str(&names.join(","))
    }
}

impl Serialize for ModeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bits(u32),
            Text(String),
            List(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bits(bits) => ModeSet::from_bits(bits).map_err(serde::de::Error::custom),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::List(items) => items
                .iter()
                .map(|item| {
                    ToolMode::parse(item)
                        .ok_or_else(|| format!("unknown tool mode '{}'", item))
                })
                .collect::<Result<ModeSet, String>>()
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A configuration-dependent predicate a tool must satisfy to be exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    ProjectId,
    PrometheusConfigured,
}

impl Precondition {
    pub fn holds(self, settings: &Settings) -> bool {
        match self {
            Precondition::ProjectId => settings.connection.project_id.is_some(),
            Precondition::PrometheusConfigured => settings
                .prometheus
                .as_ref()
                .map(|p| p.uri.is_some())
                .unwrap_or(false),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Precondition::ProjectId => "requires connection.project_id",
            Precondition::PrometheusConfigured => "requires prometheus.uri",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    Tool,
    Resource { uri: String },
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub modes: ModeSet,
    pub precondition: Option<Precondition>,
    pub kind: ToolKind,
}

impl ToolDescriptor {
    pub fn tool(name: &str, description: &str, modes: &[ToolMode]) -> Self {
        Self {
            name: name.to_string(),
            description: description.trim().to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            modes: ModeSet::of(modes),
            precondition: None,
            kind: ToolKind::Tool,
        }
    }

    pub fn resource(name: &str, uri: &str, description: &str, modes: &[ToolMode]) -> Self {
        Self {
            kind: ToolKind::Resource {
                uri: uri.to_string(),
            },
            ..Self::tool(name, description, modes)
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn is_experimental(&self) -> bool {
        self.modes.contains(ToolMode::Experimental)
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.kind, ToolKind::Resource { .. })
    }

    pub fn resource_uri(&self) -> Option<&str> {
        match &self.kind {
            ToolKind::Resource { uri } => Some(uri),
            ToolKind::Tool => None,
        }
    }

    /// The exposure predicate: mask overlap, experimental opt-in, precondition.
    pub fn is_exposed(&self, mode: &ModeSet, settings: &Settings) -> bool {
        if !self.modes.intersects(mode) {
            return false;
        }
        if self.is_experimental() && !settings.experimental_enabled() {
            return false;
        }
        self.precondition
            .map(|precondition| precondition.holds(settings))
            .unwrap_or(true)
    }

    pub fn to_listing(&self) -> Value {
        match &self.kind {
            ToolKind::Tool => serde_json::json!({
                "name": self.name,
                "description": self.description,
                "inputSchema": self.input_schema,
            }),
            ToolKind::Resource { uri } => serde_json::json!({
                "uri": uri,
                "name": self.name,
                "description": self.description,
                "mimeType": "text/plain",
            }),
        }
    }
}

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
    validator: Option<JSONSchema>,
}

impl RegisteredTool {
    pub fn schema_compiled(&self) -> bool {
        self.validator.is_some()
    }

    pub fn validate_args(&self, args: &Value) -> Result<(), ToolError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        if let Err(errors) = validator.validate(args) {
            let rendered: Vec<String> = errors
                .take(10)
                .map(|err| {
                    let path = err.instance_path.to_string();
                    let path = if path.is_empty() { "(root)".to_string() } else { path };
                    format!("- {}: {}", path, err)
                })
                .collect();
            return Err(ToolError::invalid_params(format!(
                "Invalid arguments for {}\n{}",
                self.descriptor.name,
                rendered.join("\n")
            )));
        }
        Ok(())
    }
}

/// Process-wide tool catalog. Populated once at startup, read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool; a tool with the same name is replaced in place.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        let validator = JSONSchema::compile(&descriptor.input_schema).ok();
        let entry = RegisteredTool {
            descriptor,
            handler,
            validator,
        };
        match self
            .tools
            .iter_mut()
            .find(|tool| tool.descriptor.name == entry.descriptor.name)
        {
            Some(existing) => *existing = entry,
            None => self.tools.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.descriptor.name == name)
    }

    pub fn tools(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter().map(|tool| &tool.descriptor)
    }

    /// Every exposed entry, tools and resources alike.
    pub fn list_exposed(&self, mode: &ModeSet, settings: &Settings) -> Vec<&ToolDescriptor> {
        self.descriptors()
            .filter(|descriptor| descriptor.is_exposed(mode, settings))
            .collect()
    }

    pub fn list_available(&self, mode: &ModeSet, settings: &Settings) -> Vec<&ToolDescriptor> {
        self.list_exposed(mode, settings)
            .into_iter()
            .filter(|descriptor| !descriptor.is_resource())
            .collect()
    }

    pub fn list_resources(&self, mode: &ModeSet, settings: &Settings) -> Vec<&ToolDescriptor> {
        self.list_exposed(mode, settings)
            .into_iter()
            .filter(|descriptor| descriptor.is_resource())
            .collect()
    }

    /// Looks a tool up and re-checks exposure against the given snapshot.
    pub fn resolve(
        &self,
        name: &str,
        mode: &ModeSet,
        settings: &Settings,
    ) -> Result<&RegisteredTool, ToolError> {
        let Some(tool) = self.get(name) else {
            return Err(ToolError::unavailable(format!("Unknown tool: {}", name)));
        };
        let descriptor = &tool.descriptor;
        if !descriptor.modes.intersects(mode) {
            return Err(ToolError::unavailable(format!(
                "Tool {} is not enabled in mode {}",
                name, mode
            ))
            .with_hint(format!("Enable one of: {}", descriptor.modes)));
        }
        if descriptor.is_experimental() && !settings.experimental_enabled() {
            return Err(ToolError::unavailable(format!("Tool {} is experimental", name))
                .with_hint("Set tools.enable_experimental to true"));
        }
        if let Some(precondition) = descriptor.precondition {
            if !precondition.holds(settings) {
                return Err(ToolError::unavailable(format!(
                    "Tool {} {}",
                    name,
                    precondition.describe()
                )));
            }
        }
        Ok(tool)
    }

    pub fn resolve_resource(
        &self,
        uri: &str,
        mode: &ModeSet,
        settings: &Settings,
    ) -> Result<&RegisteredTool, ToolError> {
        let name = self
            .tools
            .iter()
            .find(|tool| tool.descriptor.resource_uri() == Some(uri))
            .map(|tool| tool.descriptor.name.clone())
            .ok_or_else(|| ToolError::unavailable(format!("Unknown resource: {}", uri)))?;
        self.resolve(&name, mode, settings)
    }
}
