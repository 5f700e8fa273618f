//! Prompt assembly for review and chat generation.
//!
//! Retrieved precedents are wrapped in a marker pair that should never appear
//! in natural text, and every template tells the model not to write any
//! `<<<…>>>` marker into its answer. When retrieval came back empty the
//! precedent block is replaced by a "no precedents" block, so each assembled
//! prompt carries exactly one of the two.
//!
//! ```text
//! <<<CASE_PRECEDENTS>>>            <<<NO_CASE_PRECEDENTS>>>
//! [1] Source: ...                   No relevant precedents ...
//! ...                               <<<END_NO_CASE_PRECEDENTS>>>
//! <<<END_CASE_PRECEDENTS>>>
//! ```
//!
//! Both modes go through [`assemble_prompt`]; only the surrounding template
//! differs.

use crate::models::RetrievedPrecedent;

pub const PRECEDENTS_OPEN: &str = "<<<CASE_PRECEDENTS>>>";
pub const PRECEDENTS_CLOSE: &str = "<<<END_CASE_PRECEDENTS>>>";
pub const NO_PRECEDENTS_OPEN: &str = "<<<NO_CASE_PRECEDENTS>>>";
pub const NO_PRECEDENTS_CLOSE: &str = "<<<END_NO_CASE_PRECEDENTS>>>";

const NO_PRECEDENTS_BODY: &str = "No relevant precedents were found in the case database. \
Apply general principles of Korean contract and civil law instead.";

const MARKER_RULE: &str = "Text between lines that start with <<< and end with >>> is internal \
reference material. Never reproduce those marker lines, or any text wrapped in <<< and >>>, \
in your answer.";

/// Which consumer the prompt is for.
#[derive(Debug, Clone, Copy)]
pub enum PromptMode<'a> {
    /// Structured contract review returning one JSON object.
    Review { contract_text: &'a str },
    /// Conversational answer to a user question.
    Chat {
        question: &'a str,
        /// Passage the user is currently looking at, if any.
        viewing: Option<&'a str>,
    },
}

/// Break up marker-like sequences in caller or corpus text so that nothing
/// outside the assembler can open or close a block.
pub fn neutralize_markers(text: &str) -> String {
    text.replace("<<<", "< < <").replace(">>>", "> > >")
}

/// Render the precedent block, or the "no precedents" block when empty.
pub fn build_context_block(precedents: &[RetrievedPrecedent]) -> String {
    if precedents.is_empty() {
        return format!(
            "{}\n{}\n{}",
            NO_PRECEDENTS_OPEN, NO_PRECEDENTS_BODY, NO_PRECEDENTS_CLOSE
        );
    }

    let mut block = String::from(PRECEDENTS_OPEN);
    block.push('\n');
    for (i, p) in precedents.iter().enumerate() {
        let source = neutralize_markers(&p.source);
        match &p.date {
            Some(date) => block.push_str(&format!(
                "[{}] Source: {} ({})\n",
                i + 1,
                source,
                neutralize_markers(date)
            )),
            None => block.push_str(&format!("[{}] Source: {}\n", i + 1, source)),
        }
        block.push_str(neutralize_markers(p.text.trim()).as_str());
        block.push_str("\n\n");
    }
    block.push_str(PRECEDENTS_CLOSE);
    block
}

/// Merge the context block and caller content into the final prompt.
pub fn assemble_prompt(precedents: &[RetrievedPrecedent], mode: PromptMode<'_>) -> String {
    let context = build_context_block(precedents);
    match mode {
        PromptMode::Review { contract_text } => review_prompt(&context, contract_text),
        PromptMode::Chat { question, viewing } => chat_prompt(&context, question, viewing),
    }
}

fn review_prompt(context: &str, contract_text: &str) -> String {
    let contract = if contract_text.trim().is_empty() {
        "(No typed text was provided. Review the attached contract images.)".to_string()
    } else {
        neutralize_markers(contract_text.trim())
    };

    format!(
        r#"You are a highly experienced Korean contract lawyer (변호사).
Review the provided contract materials (images, documents, text) as ONE complete document.

REFERENCE PRECEDENTS:
{context}

CRITICAL INSTRUCTIONS:
1. **GROUNDING:** Use the reference precedents as grounding for your judgement. Cite them generically by their source (e.g. "대법원 판례에 따르면"), never by copying the reference block.
2. **EXHAUSTIVE SEARCH:** Find EVERY SINGLE clause that poses a risk. Do not limit the count.
3. **STRICT AUDIT:** Be extremely critical.
4. **FINDINGS:** For each finding give a location hint (article number or a short quote), a "type" that is exactly "위험" or "주의", a plain-language reason, and a fair rewrite.
5. **LANGUAGE:** All output MUST be in natural KOREAN (한국어).
6. **MARKERS:** {marker_rule}

CONTRACT TEXT:
{contract}

OUTPUT: Return exactly one JSON object and nothing else (no Markdown, no commentary):
{{
    "title": "Short title (e.g. '강남 오피스텔 임대차 계약')",
    "score": 75,
    "score_comment": "One sentence summary of risk.",
    "analysis": [
        {{
            "type": "위험",
            "location": "제5조 2항",
            "original": "Original text",
            "reason": "Why is this dangerous? (Korean)",
            "fix": "Fair rewrite (Korean)"
        }},
        {{
            "type": "주의",
            "location": "제9조",
            "original": "Original text",
            "reason": "Why check this? (Korean)",
            "fix": "Fair rewrite (Korean)"
        }}
    ]
}}"#,
        context = context,
        marker_rule = MARKER_RULE,
        contract = contract,
    )
}

fn chat_prompt(context: &str, question: &str, viewing: Option<&str>) -> String {
    let viewing_section = match viewing.map(str::trim).filter(|v| !v.is_empty()) {
        Some(passage) => format!(
            "\nCURRENTLY VIEWED PASSAGE:\n{}\n",
            neutralize_markers(passage)
        ),
        None => String::new(),
    };

    format!(
        r#"You are ClauseMate, an assistant for Korean contract law questions.

REFERENCE PRECEDENTS:
{context}
{viewing_section}
STYLE RULES:
- No greetings and no self-introduction. Start directly with the answer.
- Give the answer first, then the supporting explanation.
- Cite precedents naturally inline by their source (e.g. "대법원 판례에서도 ..."), never by copying the reference block.
- For longer answers use short itemised lists.
- Answer in natural Korean (한국어).
- {marker_rule}

QUESTION:
{question}"#,
        context = context,
        viewing_section = viewing_section,
        marker_rule = MARKER_RULE,
        question = neutralize_markers(question.trim()),
    )
}
