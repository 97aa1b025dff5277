// src/generate.rs
//! Renders tailored documents to PDF through the typst CLI.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

pub struct DocumentGenerator {
    output_dir: PathBuf,
}

impl DocumentGenerator {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Compile a tailored resume. `body` is Typst markup from the model.
    pub async fn render_resume(
        &self,
        candidate_name: &str,
        company: &str,
        body: &str,
    ) -> Result<PathBuf> {
        let markup = build_resume_markup(candidate_name, body);
        self.compile(company, "resume", &markup).await
    }

    /// Compile a cover letter. `body` is plain text from the model.
    pub async fn render_cover_letter(
        &self,
        candidate_name: &str,
        company: &str,
        body: &str,
    ) -> Result<PathBuf> {
        let markup = build_cover_letter_markup(candidate_name, company, body);
        self.compile(company, "cover-letter", &markup).await
    }

    async fn compile(&self, company: &str, kind: &str, markup: &str) -> Result<PathBuf> {
        crate::utils::ensure_directory(&self.output_dir).await?;

        let typ_path = crate::utils::output_file_path(&self.output_dir, company, kind, "typ");
        let pdf_path = typ_path.with_extension("pdf");

        crate::utils::write_file_content(&typ_path, markup).await?;

        let status = Command::new("typst")
            .arg("compile")
            .arg(&typ_path)
            .arg(&pdf_path)
            .status()
            .context("Failed to execute typst command")?;

        if !status.success() {
            anyhow::bail!("Typst compilation failed for {}", typ_path.display());
        }

        // The markup file is an intermediate
        let _ = tokio::fs::remove_file(&typ_path).await;

        info!("Compiled {} to {}", kind, pdf_path.display());
        Ok(pdf_path)
    }
}

fn build_resume_markup(candidate_name: &str, body: &str) -> String {
    format!(
        r#"#set page(margin: 1.8cm)
#set text(size: 10.5pt)

#align(center)[#text(size: 16pt, weight: "bold")[{}]]

{}
"#,
        escape_typst(candidate_name),
        body
    )
}

fn build_cover_letter_markup(candidate_name: &str, company: &str, body: &str) -> String {
    format!(
        r#"#set page(margin: 2.2cm)
#set text(size: 11pt)

#text(weight: "bold")[{}]

#v(1em)

{}

#v(2em)
{}
"#,
        escape_typst(candidate_name),
        escape_typst(body),
        escape_typst(candidate_name)
    )
}

/// Escape characters that typst would interpret as markup in model output.
fn escape_typst(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '#' | '@' | '$' | '<' | '>' | '*' | '_' | '`' => format!("\\{}", c),
            _ => c.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_typst() {
        assert_eq!(escape_typst("pay is $90k #1 team"), "pay is \\$90k \\#1 team");
        assert_eq!(escape_typst("plain text"), "plain text");
    }

    #[test]
    fn test_cover_letter_markup_signs_with_candidate() {
        let markup = build_cover_letter_markup("Jordan Doe", "Acme", "Dear team,");
        assert!(markup.contains("Dear team,"));
        assert!(markup.trim_end().ends_with("Jordan Doe"));
    }

    #[test]
    fn test_resume_markup_keeps_model_typst() {
        let markup = build_resume_markup("Jordan Doe", "= Experience\n- Built things");
        assert!(markup.contains("= Experience"));
        assert!(markup.contains("#align(center)"));
    }
}
