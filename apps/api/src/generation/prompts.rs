// Prompt text shared by every generation backend.
// Placeholders are filled in one pass over the template; substituted text is never
// scanned again, so braces in user-supplied text come through verbatim.

use crate::models::CustomizationRequest;

pub const CUSTOMIZE_SYSTEM: &str = "You are an expert resume editor working in LaTeX. \
    You return ONLY a complete, compilable LaTeX document. \
    Do NOT include explanations, comments about your changes, or apologies.";

pub const CUSTOMIZE_PROMPT_TEMPLATE: &str = "\
Customize the LaTeX resume below so it matches the job description.

INSTRUCTIONS:
- Modify primarily these sections: {sections}
- Change approximately {intensity}% of the content in those sections
- Keep the overall length, structure and LaTeX formatting intact
- Do not invent employers, titles, dates or credentials
- Every LaTeX command and environment must remain valid

JOB DESCRIPTION:
{target_description}

RESUME (LaTeX):
{source_document}

Return the complete updated LaTeX document.";

pub fn build_customization_prompt(request: &CustomizationRequest) -> String {
    let sections = request.section_list();
    let intensity = request.intensity.to_string();
    fill_template(
        CUSTOMIZE_PROMPT_TEMPLATE,
        &[
            ("sections", sections.as_str()),
            ("intensity", intensity.as_str()),
            ("target_description", request.target_description.trim()),
            ("source_document", request.source_document.trim()),
        ],
    )
}

/// Replaces each `{name}` in `template` with its value. Unknown `{...}` sequences
/// are copied as-is.
fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let hit = vars.iter().find_map(|(name, value)| {
            tail.strip_prefix(name)
                .and_then(|after| after.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
