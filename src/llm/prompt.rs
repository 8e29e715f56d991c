//! Prompt assembly for the analysis and structuring calls.

use std::fmt::Write;

use crate::models::{ChatMessage, ChunkMatch, CompanyAnalysis, SearchResult};

/// Retrieved chunk bodies are cut to this many characters in the prompt.
const MAX_CONTEXT_CONTENT: usize = 2_000;

/// Remove chat-template control tokens (`<|im_start|>`, `<|endoftext|>`, ...)
/// so external text cannot open a new turn.
pub fn sanitize_for_prompt(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<|") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("|>") {
            Some(end) if end <= 32 && is_token_name(&after[..end]) => {
                rest = &after[end + 2..];
            }
            _ => {
                out.push_str("<|");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn system_prompt() -> String {
    String::from(
        "You are an expert business analyst. You write data-driven, balanced and \
         insightful company analyses from the research material supplied in the \
         user message. When information is missing from the material, make a \
         reasonable inference and say explicitly that it is an inference rather \
         than a fact.",
    )
}

/// Format the search results and retrieved chunks as one context block.
pub fn build_context_block(results: &[SearchResult], matches: &[ChunkMatch]) -> String {
    let mut ctx = String::new();

    for (i, r) in results.iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = write!(
            ctx,
            "[{}] {}\nURL: {}\nDescription: {}\n\n",
            i + 1,
            non_empty(&sanitize_for_prompt(&r.title), "No title"),
            non_empty(&r.url, "No URL"),
            non_empty(&sanitize_for_prompt(&r.snippet), "No description"),
        );
    }

    for (i, m) in matches.iter().enumerate() {
        let content = sanitize_for_prompt(truncate_chars(&m.content, MAX_CONTEXT_CONTENT));
        let _ = write!(
            ctx,
            "[VDB {}] {}\nURL: {}\nContent: {}\n\n",
            i + 1,
            non_empty(&sanitize_for_prompt(&m.title), "No title"),
            non_empty(&m.url, "No URL"),
            non_empty(&content, "No content"),
        );
    }

    if ctx.is_empty() {
        ctx.push_str("(No research material was found.)\n");
    }
    ctx
}

/// Messages for the main analysis call.
pub fn build_analysis_messages(
    company_name: &str,
    results: &[SearchResult],
    matches: &[ChunkMatch],
) -> Vec<ChatMessage> {
    let company = sanitize_for_prompt(company_name);
    let context = build_context_block(results, matches);
    let user = format!(
        "Provide a comprehensive analysis of {company}.\n\n\
         Use the following search results to inform your analysis:\n\n\
         {context}---\n\
         Provide a detailed analysis covering:\n\
         1. Basic company information (name, industry, description, founding date, headquarters, key products, competitors)\n\
         2. Financial performance (revenue, profit margin, market cap, P/E ratio, recent performance, growth prospects)\n\
         3. Market position (market share, target audience, market trends, opportunities, threats)\n\
         4. Business strategy, strengths and weaknesses\n\
         5. An executive summary\n\
         6. The list of sources used"
    );
    vec![ChatMessage::system(system_prompt()), ChatMessage::user(user)]
}

const STRUCTURE_TEMPLATE: &str = r#"{
  "company_info": {"name": "", "industry": "", "description": "", "founded": "", "headquarters": "", "key_products": [], "competitors": []},
  "financial_analysis": {"revenue": "", "profit_margin": "", "market_cap": "", "pe_ratio": "", "recent_performance": "", "growth_prospects": ""},
  "market_analysis": {"market_position": "", "market_share": "", "target_audience": "", "market_trends": "", "opportunities": [], "threats": []},
  "strengths_weaknesses": {"strengths": [], "weaknesses": []},
  "summary": "",
  "sources": []
}"#;

/// Messages asking the model to restate a report as JSON.
pub fn build_structure_messages(company_name: &str, report: &str) -> Vec<ChatMessage> {
    let company = sanitize_for_prompt(company_name);
    let report = sanitize_for_prompt(report);
    let user = format!(
        "Convert the following analysis of {company} into a JSON object.\n\n\
         {report}\n\n\
         The JSON must have exactly this structure, with company_info.name set to \"{company}\":\n\
         {STRUCTURE_TEMPLATE}\n\n\
         Return only the JSON object, nothing else."
    );
    vec![ChatMessage::user(user)]
}

/// Parse the outermost `{ ... }` span of a model response.
pub fn parse_structured_analysis(content: &str) -> Option<CompanyAnalysis> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<CompanyAnalysis>(&content[start..=end]) {
        Ok(analysis) => Some(analysis),
        Err(e) => {
            tracing::warn!("Failed to parse structured analysis: {e}");
            None
        }
    }
}

fn non_empty<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
