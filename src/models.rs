use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A chunk ready to be inserted into the similarity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    pub url: String,
    pub chunk_number: usize,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub company_name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
}

/// A persisted row of the `site_pages` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: i64,
    pub url: String,
    pub chunk_number: usize,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub company_name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    pub fn from_new(id: i64, chunk: NewChunk) -> Self {
        Self {
            id,
            url: chunk.url,
            chunk_number: chunk.chunk_number,
            title: chunk.title,
            summary: chunk.summary,
            content: chunk.content,
            company_name: chunk.company_name,
            metadata: chunk.metadata,
            embedding: chunk.embedding,
        }
    }
}

/// A row returned by the similarity function, ranked by `similarity`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub id: i64,
    pub url: String,
    pub chunk_number: usize,
    pub title: String,
    pub summary: String,
    pub content: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub similarity: f32,
}

/// Output of one analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyReport {
    pub company_name: String,
    /// The model's analysis text
    pub report: String,
    /// URLs the analysis was built from, first-seen order
    pub sources: Vec<String>,
    /// Structured view, only when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<CompanyAnalysis>,
    pub generated_at: DateTime<Utc>,
}

/// Analyze request
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub company_name: String,
    /// Overrides the configured number of search results
    pub num_results: Option<usize>,
    #[serde(default)]
    pub structured: bool,
}

/// A chat turn sent to the completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// ─── Structured analysis ─────────────────────────────────

const NOT_STRUCTURED: &str = "Information not structured";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyInfo {
    pub name: String,
    pub industry: String,
    pub description: String,
    pub founded: String,
    pub headquarters: String,
    pub key_products: Vec<String>,
    pub competitors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialAnalysis {
    pub revenue: String,
    pub profit_margin: String,
    pub market_cap: String,
    pub pe_ratio: String,
    pub recent_performance: String,
    pub growth_prospects: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketAnalysis {
    pub market_position: String,
    pub market_share: String,
    pub target_audience: String,
    pub market_trends: String,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthsWeaknesses {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

/// Structured company analysis extracted from a free-text report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyAnalysis {
    pub company_info: CompanyInfo,
    pub financial_analysis: FinancialAnalysis,
    pub market_analysis: MarketAnalysis,
    pub strengths_weaknesses: StrengthsWeaknesses,
    pub summary: String,
    pub sources: Vec<String>,
}

impl CompanyAnalysis {
    /// Placeholder analysis used when the report could not be structured.
    /// The raw report is kept as the summary.
    pub fn fallback(company_name: &str, report: &str) -> Self {
        let text = || NOT_STRUCTURED.to_string();
        let list = || vec![NOT_STRUCTURED.to_string()];
        Self {
            company_info: CompanyInfo {
                name: company_name.to_string(),
                industry: text(),
                description: "See summary for details".to_string(),
                founded: text(),
                headquarters: text(),
                key_products: list(),
                competitors: list(),
            },
            financial_analysis: FinancialAnalysis {
                revenue: text(),
                profit_margin: text(),
                market_cap: text(),
                pe_ratio: text(),
                recent_performance: text(),
                growth_prospects: text(),
            },
            market_analysis: MarketAnalysis {
                market_position: text(),
                market_share: text(),
                target_audience: text(),
                market_trends: text(),
                opportunities: list(),
                threats: list(),
            },
            strengths_weaknesses: StrengthsWeaknesses {
                strengths: list(),
                weaknesses: list(),
            },
            summary: report.to_string(),
            sources: list(),
        }
    }

    /// Render as a Markdown document.
    pub fn to_markdown(&self) -> String {
        use std::fmt::Write;

        let info = &self.company_info;
        let fin = &self.financial_analysis;
        let market = &self.market_analysis;
        let sw = &self.strengths_weaknesses;
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "# Analysis of {}\n", info.name);

        out.push_str("## Company Information\n");
        let _ = writeln!(out, "- **Industry**: {}", info.industry);
        let _ = writeln!(out, "- **Description**: {}", info.description);
        let _ = writeln!(out, "- **Founded**: {}", info.founded);
        let _ = writeln!(out, "- **Headquarters**: {}", info.headquarters);
        out.push_str("- **Key Products/Services**:\n");
        push_items(&mut out, "  - ", &info.key_products);
        out.push_str("- **Main Competitors**:\n");
        push_items(&mut out, "  - ", &info.competitors);

        out.push_str("\n## Financial Analysis\n");
        let _ = writeln!(out, "- **Revenue**: {}", fin.revenue);
        let _ = writeln!(out, "- **Profit Margin**: {}", fin.profit_margin);
        let _ = writeln!(out, "- **Market Cap**: {}", fin.market_cap);
        let _ = writeln!(out, "- **P/E Ratio**: {}", fin.pe_ratio);
        let _ = writeln!(out, "- **Recent Performance**: {}", fin.recent_performance);
        let _ = writeln!(out, "- **Growth Prospects**: {}", fin.growth_prospects);

        out.push_str("\n## Market Analysis\n");
        let _ = writeln!(out, "- **Market Position**: {}", market.market_position);
        let _ = writeln!(out, "- **Market Share**: {}", market.market_share);
        let _ = writeln!(out, "- **Target Audience**: {}", market.target_audience);
        let _ = writeln!(out, "- **Market Trends**: {}", market.market_trends);
        out.push_str("- **Opportunities**:\n");
        push_items(&mut out, "  - ", &market.opportunities);
        out.push_str("- **Threats**:\n");
        push_items(&mut out, "  - ", &market.threats);

        out.push_str("\n## Strengths & Weaknesses\n### Strengths\n");
        push_items(&mut out, "- ", &sw.strengths);
        out.push_str("\n### Weaknesses\n");
        push_items(&mut out, "- ", &sw.weaknesses);

        let _ = writeln!(out, "\n## Executive Summary\n{}", self.summary);

        out.push_str("\n## Sources\n");
        push_items(&mut out, "- ", &self.sources);
        out
    }
}

fn push_items(out: &mut String, prefix: &str, items: &[String]) {
    for item in items {
        out.push_str(prefix);
        out.push_str(item);
        out.push('\n');
    }
}
