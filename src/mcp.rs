//! Line-delimited JSON tool server.
//!
//! Each input line is `{"method": ..., "params": {...}}` and produces exactly
//! one JSON reply line. Supported methods:
//!
//! - `mcp_create_thread` → `{"thread_id": "<uuid>"}`
//! - `mcp_run_agent {thread_id, user_input}` → `{"response": "<markdown>"}`

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::analyzer::{AnalyzeOptions, Analyzer};
use crate::models::ChatMessage;

pub const INVALID_THREAD: &str = "Invalid thread ID. Please create a thread first.";

pub const HELP_MESSAGE: &str = "I couldn't identify a company name in your request. \
Please specify a company name for analysis, for example: \
'Analyze Tesla' or 'Tell me about Microsoft'.";

/// Phrases that usually precede a company name, checked in order.
const LEAD_INS: [&str; 10] = [
    "analyze",
    "research",
    "tell me about",
    "information on",
    "what do you know about",
    "can you analyze",
    "look up",
    "search for",
    "find information about",
    "company analysis for",
];

/// Words stripped from the end of an extracted name, each at most once, in order.
const TRAILING_WORDS: [&str; 7] = ["company", "corporation", "inc", "ltd", "and", "for", "of"];

#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
struct RunAgentParams {
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    user_input: String,
}

pub struct ToolServer {
    analyzer: Arc<Analyzer>,
    threads: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

impl ToolServer {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self {
            analyzer,
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one raw input line. Never fails: errors become `{"error": ...}`.
    /// Answer one JSON line per input line until `reader` is exhausted.
    /// Blank lines are skipped; a line that is not UTF-8 gets an error reply.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }

            let reply = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim_end()).await,
                Err(e) => {
                    tracing::warn!("Rejected non UTF-8 input line: {e}");
                    json!({ "error": format!("input is not valid UTF-8: {e}") })
                }
            };

            let mut out = serde_json::to_vec(&reply)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }

    pub async fn handle_line(&self, line: &str) -> Value {
        match serde_json::from_str::<ToolRequest>(line) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    pub async fn dispatch(&self, request: ToolRequest) -> Value {
        tracing::debug!("Tool call: {}", request.method);
        match request.method.as_str() {
            "mcp_create_thread" => json!({ "thread_id": self.create_thread().to_string() }),
            "mcp_run_agent" => self.run_agent(request.params).await,
            other => json!({ "error": format!("Unknown method: {other}") }),
        }
    }

    pub fn create_thread(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.threads.lock().insert(id, Vec::new());
        tracing::info!("Created thread {id}");
        id
    }

    /// Turns recorded for a thread.
    pub fn history(&self, thread_id: Uuid) -> Option<Vec<ChatMessage>> {
        self.threads.lock().get(&thread_id).cloned()
    }

    async fn run_agent(&self, params: Value) -> Value {
        let params: RunAgentParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return json!({ "error": e.to_string() }),
        };

        let Some(thread_id) = Uuid::parse_str(params.thread_id.trim())
            .ok()
            .filter(|id| self.threads.lock().contains_key(id))
        else {
            return json!({ "error": INVALID_THREAD });
        };

        self.record(thread_id, ChatMessage::user(params.user_input.clone()));
        let response = self.respond(&params.user_input).await;
        self.record(thread_id, ChatMessage::assistant(response.clone()));

        json!({ "response": response })
    }

    fn record(&self, thread_id: Uuid, message: ChatMessage) {
        if let Some(history) = self.threads.lock().get_mut(&thread_id) {
            history.push(message);
        }
    }

    /// Markdown answer for one user message.
    pub async fn respond(&self, user_input: &str) -> String {
        let Some(company) = extract_company_name(user_input) else {
            return HELP_MESSAGE.to_string();
        };

        let options = AnalyzeOptions {
            num_results: None,
            structured: true,
        };
        match self.analyzer.analyze_with(&company, &options).await {
            Ok(report) => match report.analysis {
                Some(analysis) => analysis.to_markdown(),
                None => report.report,
            },
            Err(e) => {
                tracing::warn!("Analysis of '{company}' failed: {e}");
                format!("I encountered an error while analyzing {company}: {e}")
            }
        }
    }
}

/// Best-effort company name from a chat message: text after a known lead-in
/// phrase, else two consecutive capitalized words, else the first
/// capitalized word.
pub fn extract_company_name(input: &str) -> Option<String> {
    // ASCII lowering keeps byte offsets valid for `input`.
    let lower = input.to_ascii_lowercase();

    for lead in LEAD_INS {
        let Some(pos) = lower.find(lead) else {
            continue;
        };
        let mut name = trim_punctuation(&input[pos + lead.len()..]).to_string();
        for word in TRAILING_WORDS {
            let suffix_len = word.len() + 1;
            if name.len() > suffix_len && name.to_ascii_lowercase().ends_with(&format!(" {word}")) {
                name.truncate(name.len() - suffix_len);
                name = name.trim().to_string();
            }
        }
        return (!name.is_empty()).then_some(name);
    }

    let words: Vec<&str> = input
        .split_whitespace()
        .map(trim_punctuation)
        .filter(|w| !w.is_empty())
        .collect();

    for pair in words.windows(2) {
        if is_capitalized(pair[0]) && is_capitalized(pair[1]) {
            return Some(format!("{} {}", pair[0], pair[1]));
        }
    }

    words
        .iter()
        .find(|w| is_capitalized(w))
        .map(|w| w.to_string())
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn trim_punctuation(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| matches!(c, '?' | '!' | '.' | ',' | ':' | ';' | '"' | '\''))
        .trim()
}
