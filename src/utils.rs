// src/utils.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Normalize a company or person name for file system usage
pub fn normalize_slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '_' | '.' => '-',
            c if c.is_alphanumeric() => c,
            _ => '-',
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build an output file path for a generated document
pub fn output_file_path(base: &Path, company: &str, kind: &str, ext: &str) -> PathBuf {
    base.join(format!(
        "{}_{}_{}.{}",
        normalize_slug(company),
        kind,
        chrono::Utc::now().format("%Y%m%d_%H%M%S"),
        ext
    ))
}

/// Ensure directory exists
pub async fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read file content as string with proper error context
pub async fn read_file_content(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

/// Write file content with proper error context
pub async fn write_file_content(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent).await?;
    }

    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Truncate text to a character budget, cutting at a word boundary
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(idx) => truncated[..idx].to_string(),
        None => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("Acme Corp"), "acme-corp");
        assert_eq!(normalize_slug("  Big_Co. Inc  "), "big-co-inc");
        assert_eq!(normalize_slug("Données & Co"), "données-co");
    }

    #[test]
    fn test_output_file_path() {
        let path = output_file_path(Path::new("out"), "Acme Corp", "resume", "pdf");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("acme-corp_resume_"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 100), "short");
        let cut = truncate_text("one two three four", 9);
        assert_eq!(cut, "one two");
    }
}
