//! MCP tool definitions: schema for each tool exposed over stdio JSON-RPC.

use serde_json::json;

use super::protocol::ToolDefinition;

/// All tool definitions, in `(name, description, input_schema)` form.
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "remember",
        "Store a new memory. PROACTIVE: store user preferences, decisions, insights, and project context without being asked.",
        r#"{
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short title for the memory"},
                "content": {"type": "string", "description": "The content to remember"},
                "category": {"type": "string", "enum": ["architecture", "pattern", "preference", "error", "context", "learning", "todo", "note", "relationship", "custom"], "description": "Memory category"},
                "type": {"type": "string", "enum": ["short_term", "episodic", "long_term"], "default": "short_term", "description": "Memory type"},
                "project": {"type": "string", "description": "Project this memory belongs to"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Tags for categorization"},
                "importance": {"type": "number", "minimum": 0, "maximum": 1, "description": "Explicit salience override (0-1)"},
                "scope": {"type": "string", "enum": ["project", "global"], "description": "Visibility scope"},
                "transferable": {"type": "boolean", "description": "Whether this memory may surface outside its project"}
            },
            "required": ["title", "content"]
        }"#,
    ),
    (
        "recall",
        "Search stored memories by hybrid lexical+vector relevance, biased by recency and salience.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query; omit to browse by recency/salience"},
                "project": {"type": "string", "description": "Restrict to a project"},
                "type": {"type": "string", "enum": ["short_term", "episodic", "long_term"]},
                "category": {"type": "string", "enum": ["architecture", "pattern", "preference", "error", "context", "learning", "todo", "note", "relationship", "custom"]},
                "tags": {"type": "array", "items": {"type": "string"}},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10},
                "includeGlobal": {"type": "boolean", "default": false, "description": "Include global-scope memories alongside project ones"}
            },
            "required": []
        }"#,
    ),
    (
        "forget",
        "Delete a memory by id, or every memory matching a query.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "integer", "description": "Memory id to delete"},
                "query": {"type": "string", "description": "Delete every memory matching this recall query instead of a single id"}
            },
            "required": []
        }"#,
    ),
    (
        "get_context",
        "Summarize the current project's memories for session startup: recent items, high-priority items, by-category breakdown.",
        r#"{
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project to summarize (default: current project)"},
                "query": {"type": "string", "description": "Optional focus query to bias the summary"},
                "format": {"type": "string", "enum": ["text", "json"], "default": "text"}
            },
            "required": []
        }"#,
    ),
    (
        "set_project",
        "Set the active project for this session's memory operations.",
        r#"{
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Project name"}
            },
            "required": ["name"]
        }"#,
    ),
    (
        "get_project",
        "Get the active project for this session.",
        r#"{
            "type": "object",
            "properties": {},
            "required": []
        }"#,
    ),
    (
        "graph_query",
        "Breadth-first traversal of the knowledge graph starting from an entity.",
        r#"{
            "type": "object",
            "properties": {
                "entity": {"type": "string", "description": "Entity name to start from"},
                "depth": {"type": "integer", "minimum": 1, "maximum": 4, "default": 2},
                "predicates": {"type": "array", "items": {"type": "string"}, "description": "Restrict traversal to these predicate labels"}
            },
            "required": ["entity"]
        }"#,
    ),
    (
        "graph_entities",
        "List known entities, ordered by mention count.",
        r#"{
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["system", "library", "person", "concept", "organization", "location", "other"]},
                "min_mentions": {"type": "integer", "minimum": 0, "default": 0},
                "limit": {"type": "integer", "minimum": 1, "maximum": 200, "default": 50}
            },
            "required": []
        }"#,
    ),
    (
        "graph_explain",
        "Find the chain of relationships connecting two entities, if any.",
        r#"{
            "type": "object",
            "properties": {
                "from": {"type": "string", "description": "Source entity name"},
                "to": {"type": "string", "description": "Target entity name"},
                "max_depth": {"type": "integer", "minimum": 1, "maximum": 4, "default": 4}
            },
            "required": ["from", "to"]
        }"#,
    ),
];

/// Get all tool definitions as [`ToolDefinition`] structs.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_has_a_valid_schema() {
        let tools = get_tool_definitions();
        assert_eq!(tools.len(), TOOL_DEFINITIONS.len());
        for tool in &tools {
            assert!(tool.input_schema.is_object());
            assert!(!tool.name.is_empty());
        }
    }

    #[test]
    fn tool_names_cover_the_required_surface() {
        let names: Vec<&str> = TOOL_DEFINITIONS.iter().map(|(n, _, _)| *n).collect();
        for expected in [
            "remember",
            "recall",
            "forget",
            "get_context",
            "set_project",
            "get_project",
            "graph_query",
            "graph_entities",
            "graph_explain",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }
}
