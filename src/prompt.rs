use std::fmt::Write;

use crate::tools::ToolRegistry;

const CALL_INSTRUCTIONS: &str = r#"When you need to use a tool, reply with a single JSON object like this:

{"tool": "tool_name", "parameters": {"param1": "value1", "param2": "value2"}}

Examples:
{"tool": "list_directory", "parameters": {"dirpath": "."}}
{"tool": "get_file_contents", "parameters": {"filepath": "/path/to/file"}}
{"tool": "analyze_risk_level", "parameters": {"threat_name": "SQL Injection", "affected_systems": 50, "data_exposure": true}}

Rules:
- Use at most one tool per reply.
- Parameter values must be strings, numbers or booleans.
- Do not put JSON objects with a "tool" key in your answer unless you want that tool to run.

After a tool is executed, you will receive the result and should analyze and explain it to the user."#;

/// Build the system turn: persona, then the operation catalogue and the call format
pub fn compose_system_prompt(persona: &str, registry: Option<&ToolRegistry>) -> String {
    let mut prompt = persona.trim().to_string();

    let Some(registry) = registry.filter(|r| !r.is_empty()) else {
        return prompt;
    };

    prompt.push_str("\n\nAvailable Tools:\n");
    for schema in registry.schemas() {
        // Writing to a String cannot fail
        let _ = writeln!(prompt, "- {}: {}", schema.signature(), schema.description);
    }

    prompt.push('\n');
    prompt.push_str(CALL_INSTRUCTIONS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{builtin_registry, extract};

    #[test]
    fn test_persona_only_without_tools() {
        assert_eq!(compose_system_prompt("  Be brief.\n", None), "Be brief.");

        let empty = ToolRegistry::new();
        assert_eq!(compose_system_prompt("Be brief.", Some(&empty)), "Be brief.");
    }

    #[test]
    fn test_catalogue_lists_every_operation() {
        let registry = builtin_registry().unwrap();
        let prompt = compose_system_prompt("You are a security expert.", Some(&registry));

        assert!(prompt.starts_with("You are a security expert.\n\nAvailable Tools:\n"));
        for schema in registry.schemas() {
            assert!(prompt.contains(&format!("- {}: ", schema.signature())));
        }
        assert!(prompt.contains("create_security_checklist(topic: web_app|network|cloud)"));
    }

    #[test]
    fn test_instructions_do_not_count_as_a_call() {
        // Several example calls make the instructions themselves ambiguous
        assert!(extract(CALL_INSTRUCTIONS).is_none());
    }
}
