//! Configuration persistence using toml_edit so written files carry comments.

use super::Config;
use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::DocumentMut;

const HEADER: &str = "\
# autocompress configuration
#
# Drop .webm files into the watch folder; compressed copies appear in the
# output subdirectory and the originals are removed once conversion succeeds.
";

const SECTION_COMMENTS: &[(&str, &str)] = &[
    ("watch", "# Folder to watch and which files to pick up\n"),
    (
        "stability",
        "# A file is processed once two polls in a row see the same size.\n\
         # Set max_polls to give up on files that never stop growing.\n\
         # Files still empty after zero_size_polls polls are failed.\n",
    ),
    ("output", "# What happens to outputs of failed conversions\n"),
    ("tools", "# Optional explicit ffmpeg location (otherwise PATH is used)\n"),
];

/// Save the entire config to a TOML file, with a comment above each section
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let doc = render(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
    }

    std::fs::write(path, doc.to_string())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

fn render(config: &Config) -> Result<DocumentMut> {
    let content = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    let mut doc: DocumentMut = content
        .parse()
        .with_context(|| "Failed to parse serialized config")?;

    for (index, (section, comment)) in SECTION_COMMENTS.iter().enumerate() {
        if let Some(table) = doc.get_mut(section).and_then(|item| item.as_table_mut()) {
            let prefix = if index == 0 {
                format!("{}\n{}", HEADER, comment)
            } else {
                format!("\n{}", comment)
            };
            table.decor_mut().set_prefix(prefix);
        }
    }

    Ok(doc)
}
