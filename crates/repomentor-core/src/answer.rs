//! Grounding prompts and answer generation.
//!
//! Generation failures never escape this module: they come back as the answer text
//! with an empty source list.

use std::fmt::Write;

use crate::provider::Generator;
use crate::retrieve::{RetrievalResult, Retrieved};

pub const NO_MATCHES: &str = "No relevant code found.";
pub const FILE_NOT_INDEXED: &str = "File not found in index.";
pub const DECLINE_PHRASE: &str = "I cannot find that in the provided context.";

/// Generated prose plus the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: RetrievalResult,
}

impl Answer {
    /// An answer carrying no sources (empty results and failures).
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// `path (Lstart-end)`, plus `[type: name]` for named chunks.
pub fn source_label(chunk: &Retrieved) -> String {
    let meta = &chunk.metadata;
    let mut label = format!("{} (L{}-{})", meta.file_path, meta.start_line, meta.end_line);
    if !meta.name.is_empty() {
        let _ = write!(label, " [{}: {}]", meta.kind.as_str(), meta.name);
    }
    label
}

/// Delimited context blocks in result order, separated by blank lines.
pub fn format_context(result: &[Retrieved]) -> String {
    result
        .iter()
        .map(|chunk| {
            format!(
                "--- SOURCE START: {} ---\n{}\n--- SOURCE END ---",
                source_label(chunk),
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn question_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a Senior Principal Engineer analyzing a codebase.

**INSTRUCTIONS:**
1. Answer the question based **ONLY** on the provided context.
2. Be technically precise. Mention specific **file names**, **function names**, **variables**, and **libraries**.
3. If the answer involves a process (like ingestion), step through the logic flow explicitly.
4. If the context contains specific constants (e.g., model names, numbers), quote them exactly.
5. Do not hallucinate. If the code is not in the context, say \"{DECLINE_PHRASE}\"

**CONTEXT:**
{context}

**QUESTION:**
{question}
"
    )
}

pub fn explanation_prompt(full_code: &str) -> String {
    format!("Explain this file's logic and architecture:\n\n{full_code}")
}

/// Answer `question` from `result`. Sources are returned only on success.
pub async fn compose_answer<G: Generator>(
    question: &str,
    result: RetrievalResult,
    generator: &G,
) -> Answer {
    if result.is_empty() {
        return Answer::bare(NO_MATCHES);
    }
    let prompt = question_prompt(question, &format_context(&result));
    match generator.generate(&prompt).await {
        Ok(text) => Answer {
            text,
            sources: result,
        },
        Err(e) => {
            tracing::warn!("answer generation failed: {e}");
            Answer::bare(format!("Error generating answer: {e}"))
        }
    }
}

/// Explain a file from its chunks, which must already be in line order.
pub async fn compose_explanation<G: Generator>(result: &[Retrieved], generator: &G) -> String {
    if result.is_empty() {
        return FILE_NOT_INDEXED.to_string();
    }
    let full_code = result
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    match generator.generate(&explanation_prompt(&full_code)).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("explanation failed: {e}");
            format!("Error: {e}")
        }
    }
}
