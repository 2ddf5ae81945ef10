//! Mapping between the palette data model and the MCP SDK types.
use palette::models::content::Content;
use palette::models::tool::Tool;
use rmcp::model::{JsonObject, RawContent};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub fn to_mcp_tool(tool: &Tool) -> rmcp::model::Tool {
    let schema = match &tool.input_schema {
        Value::Object(map) => map.clone(),
        _ => JsonObject::new(),
    };
    rmcp::model::Tool::new(tool.name.clone(), tool.description.clone(), Arc::new(schema))
}

pub fn from_mcp_tool(tool: rmcp::model::Tool) -> Tool {
    Tool::new(
        tool.name.to_string(),
        tool.description.map(|d| d.to_string()).unwrap_or_default(),
        Value::Object((*tool.input_schema).clone()),
    )
}

pub fn to_mcp_content(content: Content) -> rmcp::model::Content {
    match content {
        Content::Text(text) => rmcp::model::Content::text(text.text),
        Content::Image(image) => rmcp::model::Content::image(image.data, image.mime_type),
    }
}

/// Text and image items map across; anything else a server sends is skipped
pub fn from_mcp_content(content: rmcp::model::Content) -> Option<Content> {
    match content.raw {
        RawContent::Text(text) => Some(Content::text(text.text)),
        RawContent::Image(image) => Some(Content::image(image.data, image.mime_type)),
        _ => {
            debug!("skipping unsupported content item");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_keeps_schema() {
        let tool = Tool::new(
            "generate_image",
            "Generate an image",
            json!({"type": "object", "required": ["prompt"]}),
        );

        let mcp = to_mcp_tool(&tool);
        assert_eq!(mcp.name, "generate_image");
        assert_eq!(mcp.input_schema.get("required"), Some(&json!(["prompt"])));

        assert_eq!(from_mcp_tool(mcp), tool);
    }

    #[test]
    fn test_non_object_schema_becomes_empty() {
        let tool = Tool::new("noop", "", Value::Null);
        assert!(to_mcp_tool(&tool).input_schema.is_empty());
    }

    #[test]
    fn test_content_items() {
        let image = from_mcp_content(to_mcp_content(Content::image("cG5n", "image/png")));
        assert_eq!(image, Some(Content::image("cG5n", "image/png")));

        let text = from_mcp_content(to_mcp_content(Content::text("done")));
        assert_eq!(text.as_ref().and_then(|c| c.as_text()), Some("done"));
    }
}
