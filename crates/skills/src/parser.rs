//! `SKILL.md` parser.
//!
//! Parses skill files into [`SkillDefinition`] values. Two formats are
//! supported:
//!
//! 1. YAML frontmatter: `name` and `description` come from the frontmatter
//!    block, the markdown body becomes the system prompt, and any extra
//!    frontmatter keys are preserved into the skill metadata.
//! 2. Heading-based: name from the `# Title`, description from
//!    `## Description`, system prompt from `## System Prompt` or
//!    `## Instructions`, tools from a `## Tools` bullet list, environment
//!    requirements from `## Requirements` or `## Environment`.

use regex::{Regex, RegexBuilder};
use std::path::Path;

use skillbox_core::{
    EnvironmentRequirements, Error, Result, SkillDefinition, ToolKind, ToolSpec,
};

/// Parses `SKILL.md` files into [`SkillDefinition`] objects.
#[derive(Debug, Default)]
pub struct SkillParser;

impl SkillParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a skill file from disk.
    pub async fn parse(&self, skill_path: &Path) -> Result<SkillDefinition> {
        let content = tokio::fs::read_to_string(skill_path).await.map_err(|_| {
            Error::invalid_input(format!("Skill file not found: {}", skill_path.display()))
        })?;
        self.parse_content(&content, skill_path)
    }

    /// Parse skill file content. `skill_path` is used for name fallback and
    /// metadata only.
    pub fn parse_content(&self, content: &str, skill_path: &Path) -> Result<SkillDefinition> {
        let frontmatter = parse_frontmatter(content);

        let (name, description, system_prompt, body) = match &frontmatter {
            Some((fields, body)) => {
                let name = yaml_field(fields, "name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| extract_name(body, skill_path));
                let mut description = yaml_field(fields, "description")
                    .map(|v| match v {
                        serde_yaml::Value::String(s) => s.trim().to_string(),
                        other => serde_yaml::to_string(other)
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    })
                    .unwrap_or_default();
                if description.is_empty() {
                    description = extract_description(body);
                }
                let mut system_prompt = body.trim().to_string();
                if system_prompt.is_empty() {
                    system_prompt = description.clone();
                }
                (name, description, system_prompt, body.as_str())
            }
            None => {
                let name = extract_name(content, skill_path);
                let description = extract_description(content);
                let system_prompt = extract_system_prompt(content);
                (name, description, system_prompt, content)
            }
        };

        let tools = extract_tools(body);
        let environment = extract_environment(body);

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "file_path".into(),
            serde_json::Value::String(skill_path.display().to_string()),
        );
        metadata.insert("source".into(), serde_json::Value::String("file".into()));
        if let Some(version) = extract_version(content) {
            metadata.insert("version".into(), serde_json::Value::String(version));
        }
        if let Some((fields, _)) = &frontmatter {
            metadata.insert(
                "format".into(),
                serde_json::Value::String("frontmatter".into()),
            );
            // Preserve extra frontmatter fields (license, model hints, ...)
            for (key, value) in fields.iter() {
                let Some(key) = key.as_str() else { continue };
                if key == "name" || key == "description" {
                    continue;
                }
                metadata.insert(key.to_string(), serde_json::to_value(value)?);
            }
        }

        let mut skill = SkillDefinition::new(name, description, system_prompt)?;
        skill.tools = tools;
        skill.environment = environment;
        skill.metadata = metadata;
        Ok(skill)
    }
}

type Frontmatter = (serde_yaml::Mapping, String);

/// Split a leading `--- ... ---` YAML block from the body, if present.
fn parse_frontmatter(content: &str) -> Option<Frontmatter> {
    let stripped = content.trim();
    let rest = stripped.strip_prefix("---")?;
    let end = rest.find("---")?;
    let yaml_text = &rest[..end];
    let body = rest[end + 3..].to_string();

    let fields: serde_yaml::Mapping = serde_yaml::from_str(yaml_text).ok()?;
    Some((fields, body))
}

fn yaml_field<'a>(fields: &'a serde_yaml::Mapping, key: &str) -> Option<&'a serde_yaml::Value> {
    fields.get(&serde_yaml::Value::String(key.to_string()))
}

fn section_regex(heading: &str) -> Regex {
    RegexBuilder::new(&format!(r"##\s+{}\s*\n\n?(.+?)(\n##|\z)", heading))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("section pattern is valid")
}

fn extract_section(content: &str, heading: &str) -> Option<String> {
    section_regex(heading)
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
}

fn extract_name(content: &str, skill_path: &Path) -> String {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix('#') {
            let name = rest.trim_start_matches('#').trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    // Fall back to the filename, title-cased
    let stem = skill_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "skill".to_string());
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_description(content: &str) -> String {
    if let Some(desc) = extract_section(content, "Description") {
        let bold = Regex::new(r"\*\*(.+?)\*\*").expect("valid pattern");
        let code = Regex::new(r"`(.+?)`").expect("valid pattern");
        let desc = bold.replace_all(&desc, "$1");
        let desc = code.replace_all(&desc, "$1");
        return desc.trim().to_string();
    }

    // First non-heading paragraph
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if line.is_empty() {
            if !current.is_empty() {
                break;
            }
            continue;
        }
        current.push(line);
    }
    if current.is_empty() {
        "No description provided".to_string()
    } else {
        current.join(" ")
    }
}

fn extract_system_prompt(content: &str) -> String {
    extract_section(content, r"System\s+Prompt")
        .or_else(|| extract_section(content, "Instructions"))
        .unwrap_or_else(|| extract_description(content))
}

fn extract_tools(content: &str) -> Vec<ToolSpec> {
    let mut tools = Vec::new();

    if let Some(section) = extract_section(content, "Tools") {
        let bullet = Regex::new(r"(?m)^[-*]\s*(.+)$").expect("valid pattern");
        for caps in bullet.captures_iter(&section) {
            if let Some(tool) = parse_tool_line(caps[1].trim()) {
                tools.push(tool);
            }
        }
    }

    if tools.is_empty() {
        // Fall back to well-known tool names mentioned anywhere in the text
        let content_lower = content.to_lowercase();
        for name in [
            "web_search",
            "read_file",
            "write_file",
            "list_files",
            "codebase_search",
            "code_search",
            "execute_code",
            "run_code",
        ] {
            if content_lower.contains(name) && !tools.iter().any(|t: &ToolSpec| t.name == name) {
                if let Ok(tool) = ToolSpec::new(
                    name,
                    ToolKind::infer(name),
                    format!("Tool for {}", name.replace('_', " ")),
                ) {
                    tools.push(tool);
                }
            }
        }
    }

    tools
}

fn parse_tool_line(line: &str) -> Option<ToolSpec> {
    if line.is_empty() {
        return None;
    }

    // "tool_name: description", "tool_name - description", or bare name
    let separator = Regex::new(r"[:\s-]+").expect("valid pattern");
    let mut parts = separator.splitn(line, 2);
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let description = parts
        .next()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Tool for {}", name.replace('_', " ")));

    ToolSpec::new(name, ToolKind::infer(name), description).ok()
}

fn extract_environment(content: &str) -> EnvironmentRequirements {
    let section = extract_section(content, "Requirements")
        .or_else(|| extract_section(content, "Environment"));

    let mut requirements = EnvironmentRequirements::default();
    let Some(section) = section else {
        return requirements;
    };

    let python_version = Regex::new(r"(?i)python\s*([\d.]+)").expect("valid pattern");
    if let Some(caps) = python_version.captures(&section) {
        requirements.python_version = Some(caps[1].to_string());
    }

    let bullet = Regex::new(r"^[-*]\s+(.+)$").expect("valid pattern");
    for line in section.lines() {
        let line = line.trim();
        if let Some(caps) = bullet.captures(line) {
            let package = caps[1].trim();
            // Bullets that restate the interpreter version are not packages
            if !python_version.is_match(package) {
                requirements.packages.push(package.to_string());
            }
        }
    }

    requirements
}

fn extract_version(content: &str) -> Option<String> {
    Regex::new(r"(?i)version\s*[:=]\s*([\d.]+)")
        .expect("valid pattern")
        .captures(content)
        .map(|caps| caps[1].to_string())
}
