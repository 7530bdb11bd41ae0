//! Post-processing of raw model output into a LaTeX document body.

use thiserror::Error;

const DOCUMENT_CLASS: &str = "\\documentclass";
const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";

/// Returns the contents of the first fenced code block, preferring ```latex/```tex
/// fences. Text without fences is returned trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    for opener in ["```latex", "```tex", "```"] {
        if let Some(start) = text.find(opener) {
            let inner = &text[start + opener.len()..];
            let inner = match inner.find("```") {
                Some(end) => &inner[..end],
                None => inner,
            };
            return inner.trim();
        }
    }
    text
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LatexIssue {
    #[error("missing \\documentclass")]
    MissingDocumentClass,

    #[error("more than one \\documentclass")]
    MultipleDocumentClass,

    #[error("missing \\begin{{document}}")]
    MissingBeginDocument,

    #[error("missing \\end{{document}}")]
    MissingEndDocument,

    #[error("\\end{{document}} appears before \\begin{{document}}")]
    DocumentOutOfOrder,

    #[error("unbalanced braces: {open} opening vs {close} closing")]
    UnbalancedBraces { open: usize, close: usize },
}

/// Structural sanity check on a generated LaTeX document. Catches truncated or
/// chatty model output; compile errors are left to the render backends.
pub fn validate_latex(body: &str) -> Result<(), LatexIssue> {
    let class_count = body.matches(DOCUMENT_CLASS).count();
    if class_count == 0 {
        return Err(LatexIssue::MissingDocumentClass);
    }
    if class_count > 1 {
        return Err(LatexIssue::MultipleDocumentClass);
    }

    let begin = body
        .find(BEGIN_DOCUMENT)
        .ok_or(LatexIssue::MissingBeginDocument)?;
    let end = body
        .rfind(END_DOCUMENT)
        .ok_or(LatexIssue::MissingEndDocument)?;
    if end < begin {
        return Err(LatexIssue::DocumentOutOfOrder);
    }

    let (open, close) = count_braces(body);
    if open != close {
        return Err(LatexIssue::UnbalancedBraces { open, close });
    }

    Ok(())
}

/// Counts unescaped `{` and `}`; `\{` and `\}` are literal braces in LaTeX.
fn count_braces(body: &str) -> (usize, usize) {
    let mut open = 0;
    let mut close = 0;
    let mut escaped = false;
    for c in body.chars() {
        match c {
            '\\' => {
                escaped = !escaped;
                continue;
            }
            '{' if !escaped => open += 1,
            '}' if !escaped => close += 1,
            _ => {}
        }
        escaped = false;
    }
    (open, close)
}
