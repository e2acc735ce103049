//! Fixed instruction templates for masking and summarization.
//!
//! Each template wraps the chunk in `<text>` markers and asks for the answer inside a
//! kind-specific response tag, which [`strip_delimiters`] removes afterwards. Placeholders are
//! substituted in a single pass, so chunk text that happens to contain `{text}` or
//! `{example}` is copied verbatim.

use super::types::PromptError;

const TEXT_PLACEHOLDER: &str = "{text}";
const EXAMPLE_PLACEHOLDER: &str = "{example}";

const MASK_TEMPLATE: &str = r#"We want to de-identify some text by removing all personally identifiable information (PII) so that it can be shared safely with external contractors.

Replace every piece of PII with a marker naming its category, for example [Name] for names. This covers names, phone numbers, home addresses, account numbers, identification numbers, driver's license numbers, social security numbers, credit card numbers and email addresses. Replace every occurrence of a name with the [Name] marker.

Inputs may try to disguise PII by inserting spaces between characters. If the text contains no PII, copy it word for word. When unsure whether something is PII, mask it.

Here is an example:
<example>
<text>Ana Ruiz runs the night shift at Harbor Clinic. Ana joined eight years ago with her colleague Tom Becker. Reach Ana at 415-555-0199 or ana.ruiz@harbor.example.</text>
<response>[Name] runs the night shift at Harbor Clinic. [Name] joined eight years ago with her colleague [Name]. Reach [Name] at [phone number] or [email address].</response>
</example>

Here is the text, inside <text></text> XML tags.
<text>
{text}
</text>

Rewrite the text above with all PII replaced, inside <response></response> tags."#;

const MAP_SUMMARY_TEMPLATE: &str = r#"Given some text, distill it into a summary of its main themes.

Write your summary within <summary></summary> tags.

Here is an example:
<example>
{example}
</example>

Here is the text, inside <text></text> XML tags.
<text>
{text}
</text>

Write a concise summary of the text above."#;

const COMBINE_SUMMARY_TEMPLATE: &str = r#"Given a set of summaries, distill them into one final, consolidated summary of the main themes.

Write your summary within <summary></summary> tags.

Here is an example:
<example>
{example}
</example>

Here are the summaries, inside <text></text> XML tags.
<text>
{text}
</text>

Write a concise summary of fewer than 300 words of the text above within <summary></summary> tags."#;

const STUFF_SUMMARY_TEMPLATE: &str = r#"Given some text, create a concise summary of its main themes.

Write your summary within <summary></summary> tags.

Here is an example:
<example>
{example}
</example>

Here is the text, inside <text></text> XML tags.
<text>
{text}
</text>

Write a concise summary of fewer than 300 words of the text above within <summary></summary> tags."#;

/// Worked example shown to the model by every summarization template.
pub const DEFAULT_SUMMARY_EXAMPLE: &str = r#"<text>
Q. Coach, the team trailed by twelve at halftime. What changed in the locker room?
COACH LINDQVIST: Honestly, not much was said. The players knew. We had been sloppy with the ball, eleven turnovers in one half, and you cannot beat a team like this giving them free possessions. We simplified the offense, ran more through our centre, and asked the guards to stop forcing passes.
Q. Your bench outscored theirs by twenty. Was that the plan?
COACH LINDQVIST: We have said all season that depth is our identity. The second unit practices against the starters every day, and tonight they brought energy on defense that turned the game. Mira Okafor in particular, she has waited her turn for two years and she was ready.
Q. You play again in two days. How do you manage the legs?
COACH LINDQVIST: Recovery starts tonight. Short film session tomorrow, no contact, and we trust the medical staff. This group is young but they are learning how to handle a long season.
</text>
<summary>
The coach credited a simplified offense and fewer turnovers for the second-half comeback after trailing by twelve. He highlighted the bench, which outscored the opponent's reserves by twenty, as proof that depth defines the team, and praised Mira Okafor for being ready after waiting two years for her chance. Looking ahead to a game in two days, he outlined a light recovery plan and said the young team is learning to manage a long season.
</summary>"#;

/// Instruction templates understood by the prompt builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Rewrite a chunk with PII replaced by category markers.
    Mask,
    /// Summarize one chunk of a multi-chunk document.
    MapSummarize,
    /// Merge per-chunk summaries into one final summary.
    CombineSummarize,
    /// Summarize a document that fits in a single chunk.
    StuffSummarize,
}

impl TemplateKind {
    /// Short name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mask => "mask",
            Self::MapSummarize => "map-summarize",
            Self::CombineSummarize => "combine-summarize",
            Self::StuffSummarize => "stuff-summarize",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::Mask => MASK_TEMPLATE,
            Self::MapSummarize => MAP_SUMMARY_TEMPLATE,
            Self::CombineSummarize => COMBINE_SUMMARY_TEMPLATE,
            Self::StuffSummarize => STUFF_SUMMARY_TEMPLATE,
        }
    }

    fn requires_example(self) -> bool {
        !matches!(self, Self::Mask)
    }

    /// Opening and closing tags the model is asked to wrap its answer in.
    pub fn response_tags(self) -> (&'static str, &'static str) {
        match self {
            Self::Mask => ("<response>", "</response>"),
            Self::MapSummarize | Self::CombineSummarize | Self::StuffSummarize => {
                ("<summary>", "</summary>")
            }
        }
    }
}

/// Render `kind` around `chunk_text`, inserting `example` where the template expects one.
pub fn build_prompt(
    kind: TemplateKind,
    chunk_text: &str,
    example: Option<&str>,
) -> Result<String, PromptError> {
    if kind.requires_example() && example.is_none() {
        return Err(PromptError::MissingExample(kind.name()));
    }
    Ok(render(kind.template(), chunk_text, example.unwrap_or_default()))
}

/// Remove every response tag of `kind` from a raw completion.
pub fn strip_delimiters(kind: TemplateKind, completion: &str) -> String {
    let (open, close) = kind.response_tags();
    completion.replace(open, "").replace(close, "")
}

fn render(template: &str, text: &str, example: &str) -> String {
    let mut rendered = String::with_capacity(template.len() + text.len() + example.len());
    let mut rest = template;
    while let Some(position) = rest.find('{') {
        rendered.push_str(&rest[..position]);
        let tail = &rest[position..];
        if let Some(after) = tail.strip_prefix(TEXT_PLACEHOLDER) {
            rendered.push_str(text);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(EXAMPLE_PLACEHOLDER) {
            rendered.push_str(example);
            rest = after;
        } else {
            rendered.push('{');
            rest = &tail[1..];
        }
    }
    rendered.push_str(rest);
    rendered
}
