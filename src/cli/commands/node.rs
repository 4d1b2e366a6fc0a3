//! Node metadata commands.

use crate::cli::NodeCommands;
use crate::error::{Error, Result};
use crate::service;
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::Path;

use super::{open_context, print_json};

/// Execute node commands.
///
/// # Errors
///
/// Returns an error if the operation fails.
pub fn execute(command: &NodeCommands, project: Option<&Path>, json: bool) -> Result<()> {
    let ctx = open_context(project)?;
    match command {
        NodeCommands::Show { node } => {
            let meta = ctx.node_meta.for_node(node)?;
            if json {
                return print_json(&meta);
            }
            match meta {
                Some(meta) if !meta.fields.is_empty() => {
                    println!("{}", node.cyan());
                    for (key, value) in &meta.fields {
                        println!("  {key} = {value}");
                    }
                }
                _ => println!("No metadata for {node}."),
            }
            Ok(())
        }
        NodeCommands::Set { node, fields } => {
            let fields = parse_fields(fields)?;
            let meta = service::set_node_meta(&ctx, node, fields)?;
            if json {
                print_json(&meta)
            } else {
                println!("Updated {} ({} fields)", node.cyan(), meta.fields.len());
                Ok(())
            }
        }
    }
}

/// Parse `KEY=VALUE` pairs. Values that parse as JSON keep their type.
fn parse_fields(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| Error::InvalidArgument(format!("field '{pair}' must be KEY=VALUE")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidArgument(format!("field '{pair}' has an empty key")));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fields_keeps_json_types() {
        let fields = parse_fields(&[
            "collapsed=true".to_string(),
            "order=3".to_string(),
            "label=Risks".to_string(),
        ])
        .unwrap();
        assert_eq!(fields["collapsed"], json!(true));
        assert_eq!(fields["order"], json!(3));
        assert_eq!(fields["label"], json!("Risks"));
    }

    #[test]
    fn test_parse_fields_rejects_missing_equals() {
        assert!(parse_fields(&["collapsed".to_string()]).is_err());
        assert!(parse_fields(&["=1".to_string()]).is_err());
    }
}
