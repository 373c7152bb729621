//! Prompt composition from retrieved chunks.
//!
//! Document QA prompt layout:
//!
//! ```text
//! {preamble}
//!
//! KONTEXT AUS DOKUMENTEN:
//! --- Document 1 (Source: a.pdf) ---
//! {text}
//!
//! FRAGE:
//! {query}
//!
//! ANWEISUNGEN:
//! - ...
//!
//! ANTWORT:
//! ```

use rag_store::{RagHit, TokenCounter};
use tracing::{debug, warn};

/// Prompts above this many tokens are logged as too large; they are still sent.
pub const PROMPT_TOKEN_SOFT_LIMIT: usize = 120_000;

/// Output cap requested from the model for document answers.
pub const MAX_OUTPUT_TOKENS: u32 = 8_000;

/// Wording around the context block.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptTemplate {
    pub preamble: String,
    /// Rendered as a bullet list after the question.
    pub instructions: Vec<String>,
}

impl PromptTemplate {
    /// German QA template answering in `language`.
    pub fn document_qa(language: &str) -> Self {
        Self {
            preamble: "Du bist ein sorgfältiger Analyst für Unternehmensdokumente. \
                       Beantworte die folgende Frage basierend auf den bereitgestellten Dokumenten."
                .to_string(),
            instructions: vec![
                "Verwende nur Informationen aus den bereitgestellten Dokumenten".to_string(),
                "Wenn die Antwort nicht in den Dokumenten zu finden ist, sage das explizit".to_string(),
                "Zitiere spezifische Dokumente wenn möglich".to_string(),
                "Erkläre deine Schlussfolgerungen Schritt für Schritt".to_string(),
                format!("Antworte auf {language}"),
            ],
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::document_qa(crate::cfg::DEFAULT_LANGUAGE)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposedPrompt {
    pub text: String,
    pub token_count: usize,
    /// `token_count` exceeds [`PROMPT_TOKEN_SOFT_LIMIT`].
    pub over_soft_limit: bool,
}

/// Context block: hits numbered from 1 in the given order, labelled with the
/// basename of their source.
pub fn context_block(hits: &[RagHit]) -> String {
    let mut out = String::new();
    for (i, h) in hits.iter().enumerate() {
        out.push_str(&format!(
            "--- Document {} (Source: {}) ---\n{}\n\n",
            i + 1,
            h.source_name(),
            h.text
        ));
    }
    out
}

/// Builds the document QA prompt and counts its tokens.
pub fn compose(
    query: &str,
    hits: &[RagHit],
    template: &PromptTemplate,
    counter: &dyn TokenCounter,
) -> ComposedPrompt {
    let mut text = String::with_capacity(512 + hits.iter().map(|h| h.text.len() + 48).sum::<usize>());
    text.push_str(&template.preamble);
    text.push_str("\n\nKONTEXT AUS DOKUMENTEN:\n");
    text.push_str(&context_block(hits));
    text.push_str("FRAGE:\n");
    text.push_str(query);
    text.push_str("\n\nANWEISUNGEN:\n");
    for line in &template.instructions {
        text.push_str("- ");
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("\nANTWORT:");

    finish(text, counter)
}

/// Chat prompt: optional `[source]: text` context followed by the message.
pub fn compose_chat(
    message: &str,
    hits: &[RagHit],
    language: &str,
    counter: &dyn TokenCounter,
) -> ComposedPrompt {
    let context = hits
        .iter()
        .map(|h| format!("[{}]: {}", h.source_name(), h.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let context_section = if context.is_empty() {
        String::new()
    } else {
        format!("VERFÜGBARER KONTEXT:\n{context}\n\n")
    };
    let text = format!(
        "Sie sind ein erfahrener Business Analyst mit Expertise in Dokumentenanalyse.\n\n\
         {context_section}BENUTZERANFRAGE: {message}\n\n\
         Bitte geben Sie eine strukturierte, professionelle Antwort auf {language}."
    );
    finish(text, counter)
}

fn finish(text: String, counter: &dyn TokenCounter) -> ComposedPrompt {
    let token_count = counter.count(&text);
    let over_soft_limit = token_count > PROMPT_TOKEN_SOFT_LIMIT;
    if over_soft_limit {
        warn!(
            tokens = token_count,
            limit = PROMPT_TOKEN_SOFT_LIMIT,
            "prompt exceeds soft token limit"
        );
    } else {
        debug!(tokens = token_count, "prompt composed");
    }
    ComposedPrompt {
        text,
        token_count,
        over_soft_limit,
    }
}
