use bitrix_mcp_core::{Catalog, ToolDescriptor};
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Debug, Serialize)]
struct ToolSummary<'a> {
    name: &'a str,
    group: &'static str,
    title: &'a str,
    read_only: bool,
    required: Vec<&'a str>,
    optional: Vec<&'a str>,
}

impl<'a> From<&'a ToolDescriptor> for ToolSummary<'a> {
    fn from(tool: &'a ToolDescriptor) -> Self {
        Self {
            name: &tool.name,
            group: tool.operation.group(),
            title: &tool.title,
            read_only: tool.operation.is_read_only(),
            required: tool.required_params().map(|param| param.name.as_str()).collect(),
            optional: tool.optional_params().map(|param| param.name.as_str()).collect(),
        }
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let catalog = Catalog::standard();
    let summaries: Vec<ToolSummary<'_>> = catalog.tools().iter().map(ToolSummary::from).collect();

    if json_output {
        let output = serde_json::to_string_pretty(&summaries).unwrap_or_else(|error| {
            format!("{{\"error\":\"tool catalog serialization failed: {}\"}}", escape_json(&error.to_string()))
        });
        return CommandResult::text(0, output);
    }

    CommandResult::text(0, render_human(&summaries))
}

fn render_human(summaries: &[ToolSummary<'_>]) -> String {
    let mut lines = vec![format!("{} tools:", summaries.len())];
    let mut group = "";

    for tool in summaries {
        if tool.group != group {
            group = tool.group;
            lines.push(format!("[{group}]"));
        }
        let required = if tool.required.is_empty() { "-".to_string() } else { tool.required.join(", ") };
        lines.push(format!("- {} ({}): required {required}", tool.name, tool.title));
        if !tool.optional.is_empty() {
            lines.push(format!("    optional {}", tool.optional.join(", ")));
        }
    }

    lines.join("\n")
}
