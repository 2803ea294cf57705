// src/cli/help.rs

use crate::cli::dispatcher;
use crate::core::bootstrap::HelpProvider;
use crate::core::metadata_scanner::MetadataScanner;
use crate::core::registry::MetadataRegistry;
use crate::errors::ConfigError;
use crate::models::{BuildMetadata, MemberKind};
use colored::Colorize;
use std::fmt::Write;

/// Prints help built from the scanned documentation markers.
#[derive(Debug, Default)]
pub struct HelpRenderer;

impl HelpRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn member_kind(registry: &MetadataRegistry, metadata: &BuildMetadata, name: &str) -> Option<MemberKind> {
    metadata
        .hierarchy
        .iter()
        .filter_map(|type_name| registry.get(type_name))
        .find_map(|declaration| declaration.find_member(name))
        .map(|member| member.kind)
}

/// Renders the documentation of one scanned type. Hidden members are left out.
pub fn render(registry: &MetadataRegistry, metadata: &BuildMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{} {}", t!("help.header").bold(), metadata.type_name.yellow().bold());
    if let Some(text) = &metadata.doc.text {
        let _ = writeln!(out, "  {}", text);
    }
    if metadata.hierarchy.len() > 1 {
        let _ = writeln!(
            out,
            "  {} {}",
            t!("help.label.hierarchy").blue(),
            metadata.hierarchy.join(" -> ").dimmed()
        );
    }

    let mut fields = Vec::new();
    let mut actions = Vec::new();
    for (name, entry) in &metadata.documentation {
        if entry.hidden {
            continue;
        }
        let line = format!(
            "    {:<20} {}",
            name.cyan(),
            entry.text.as_deref().unwrap_or_default()
        );
        match member_kind(registry, metadata, name) {
            Some(MemberKind::Action) => actions.push(line),
            _ => fields.push(line),
        }
    }

    for (label, lines) in [(t!("help.section.fields"), &fields), (t!("help.section.actions"), &actions)] {
        if lines.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n  {}", label.green().bold());
        for line in lines {
            let _ = writeln!(out, "{}", line);
        }
    }
    out
}

fn render_plugins(registry: &MetadataRegistry, shown: &str) -> String {
    let mut out = String::new();
    let others: Vec<&str> = registry
        .names()
        .filter(|name| *name != shown)
        .filter(|name| registry.get(name).and_then(|d| d.hide) != Some(true))
        .collect();
    if !others.is_empty() {
        let _ = writeln!(out, "\n  {}", t!("help.section.plugins").green().bold());
        for name in others {
            let _ = writeln!(out, "    {}", name.cyan());
        }
    }
    let builtins: Vec<&str> = dispatcher::builtin_names().collect();
    let _ = writeln!(out, "\n  {} {}", t!("help.label.builtins").blue(), builtins.join(", ").dimmed());
    out
}

impl HelpProvider for HelpRenderer {
    fn show_help(
        &mut self,
        topic: &str,
        registry: &MetadataRegistry,
        metadata: &BuildMetadata,
    ) -> anyhow::Result<()> {
        let topic = topic.trim();
        if topic.is_empty() {
            print!("{}", render(registry, metadata));
            print!("{}", render_plugins(registry, &metadata.type_name));
            return Ok(());
        }

        let plugin = registry
            .find_plugin(topic)
            .ok_or_else(|| ConfigError::UnknownTarget {
                name: topic.to_string(),
                available: registry.names().map(str::to_string).collect(),
            })?;
        let scanned = MetadataScanner::new(registry).scan(&plugin.name)?;
        print!("{}", render(registry, &scanned));
        Ok(())
    }
}
