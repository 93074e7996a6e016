pub mod catalog;
pub mod prometheus;
pub mod search;
pub mod sql;
pub mod system;
pub mod usage;

use crate::services::registry::ToolRegistry;
use std::sync::Arc;

/// Registers every built-in tool and resource. Called once at startup.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(sql::RunSqlQuery::descriptor(), Arc::new(sql::RunSqlQuery));
    registry.register(sql::GetFailedJobDetails::descriptor(), Arc::new(sql::GetFailedJobDetails));
    registry.register(
        system::GetNameOfJobsRecentTable::descriptor(),
        Arc::new(system::GetNameOfJobsRecentTable),
    );
    registry.register(
        system::GetUsefulSystemTableNames::descriptor(),
        Arc::new(system::GetUsefulSystemTableNames),
    );
    registry.register(catalog::GetSchemaOfTable::descriptor(), Arc::new(catalog::GetSchemaOfTable));
    registry.register(
        catalog::GetTableOrViewLineage::descriptor(),
        Arc::new(catalog::GetTableOrViewLineage),
    );
    registry.register(
        catalog::GetDescriptionOfTableOrSchema::descriptor(),
        Arc::new(catalog::GetDescriptionOfTableOrSchema),
    );
    registry.register(search::SemanticSearch::descriptor(), Arc::new(search::SemanticSearch));
    registry.register(usage::BuildUsageReport::descriptor(), Arc::new(usage::BuildUsageReport));
    registry.register(
        prometheus::GetRelevantMetrics::descriptor(),
        Arc::new(prometheus::GetRelevantMetrics),
    );
    registry.register(
        prometheus::GetMetricSchema::descriptor(),
        Arc::new(prometheus::GetMetricSchema),
    );
    registry.register(prometheus::RunPromQL::descriptor(), Arc::new(prometheus::RunPromQL));
    registry.register(system::Hints::descriptor(), Arc::new(system::Hints));
}
