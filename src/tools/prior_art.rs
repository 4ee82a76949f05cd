//! Prior art search tool backed by the PatentsView API.
//!
//! The search pipeline:
//! 1. Generate PatentsView query expressions with the LLM (deterministic
//!    fallback queries when the LLM is unavailable or unparsable).
//! 2. Execute the queries against `/patent/` to collect candidate patents.
//! 3. Fetch claims for the top candidates via `/g_claim/`.
//! 4. Render a markdown report, optionally fronted by an LLM summary.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::agent::decode;
use crate::llm::{CompletionOptions, LlmClient};

use super::{str_param, u64_param, Tool, ToolFailure, ToolOutput, ToolParams};

pub const NAME: &str = "prior_art_search_tool";

pub const DEFAULT_BASE_URL: &str = "https://search.patentsview.org/api/v1";

const DEFAULT_MAX_RESULTS: u64 = 20;

/// How many candidate patents get their claims fetched.
const CLAIMS_FETCH_LIMIT: usize = 5;

const QUERY_GENERATION_SYSTEM_PROMPT: &str = "You are a senior patent search expert with deep \
knowledge of the PatentsView API. Use chain-of-thought reasoning to generate sophisticated \
search queries that balance exploration and exploitation.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a patent analyst. Summarize prior art search \
results for a patent practitioner: highlight the closest references and what they disclose. \
Be concise and concrete.";

/// Prior art search tool for finding relevant patents and analyzing patent
/// landscapes.
pub struct PriorArtSearchTool {
    http: reqwest::Client,
    llm: Option<Arc<dyn LlmClient>>,
    base_url: String,
    api_key: Option<String>,
}

/// One generated PatentsView query with the model's reasoning.
#[derive(Debug, Clone, Deserialize)]
struct SearchCriterion {
    #[serde(alias = "search_query")]
    query: serde_json::Value,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedCriteria {
    #[serde(default)]
    search_queries: Vec<SearchCriterion>,
}

#[derive(Debug, Clone, Deserialize)]
struct PatentRecord {
    patent_id: String,
    #[serde(default)]
    patent_title: String,
    #[serde(default)]
    patent_abstract: Option<String>,
    #[serde(default)]
    patent_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PatentSearchResponse {
    #[serde(default)]
    patents: Vec<PatentRecord>,
}

#[derive(Debug, Deserialize)]
struct GClaim {
    #[serde(default)]
    claim_sequence: Option<i64>,
    #[serde(default)]
    claim_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    g_claims: Vec<GClaim>,
}

impl PriorArtSearchTool {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, api_key: Option<String>) -> Self {
        Self::with_base_url(llm, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        llm: Option<Arc<dyn LlmClient>>,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Generate 3-5 PatentsView query expressions for the user's query.
    async fn generate_search_queries(
        &self,
        query: &str,
        context: Option<&str>,
        conversation_history: Option<&str>,
    ) -> Vec<SearchCriterion> {
        if let Some(llm) = &self.llm {
            let prompt = query_generation_prompt(query, context, conversation_history);
            match llm
                .complete(
                    QUERY_GENERATION_SYSTEM_PROMPT,
                    &prompt,
                    CompletionOptions {
                        max_tokens: 4096,
                        temperature: 0.2,
                    },
                )
                .await
            {
                Ok(text) => match parse_generated_criteria(&text) {
                    Some(queries) => return queries,
                    None => {
                        tracing::warn!("LLM query generation unparsable, using fallback queries");
                    }
                },
                Err(e) => {
                    tracing::warn!("LLM query generation failed: {e}, using fallback queries");
                }
            }
        }

        fallback_queries(query)
    }

    /// Execute one PatentsView `/patent/` search.
    async fn search_patents_api(
        &self,
        search_query: &serde_json::Value,
        max_results: u64,
    ) -> Result<Vec<PatentRecord>, ToolFailure> {
        let url = format!("{}/patent/", self.base_url);

        let payload = json!({
            "q": search_query,
            "f": ["patent_id", "patent_title", "patent_abstract", "patent_date"],
            "s": [{"patent_date": "desc"}],
            "o": {"size": max_results}
        });

        let mut request = self.http.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolFailure::retriable(format!("PatentsView API call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolFailure::retriable(format!(
                "PatentsView API returned status {status}"
            )));
        }

        let body: PatentSearchResponse = response
            .json()
            .await
            .map_err(|e| ToolFailure::retriable(format!("PatentsView response invalid: {e}")))?;

        Ok(body.patents)
    }

    /// Fetch claims for a single patent. Failures degrade to an empty list so
    /// one flaky claims lookup cannot sink the whole search.
    async fn fetch_patent_claims(&self, patent_id: &str) -> Vec<String> {
        let url = format!("{}/g_claim/", self.base_url);

        let payload = json!({
            "q": {"patent_id": patent_id},
            "f": ["claim_sequence", "claim_text"],
            "s": [{"claim_sequence": "asc"}],
            "o": {"size": 50}
        });

        let mut request = self.http.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let body: Result<ClaimsResponse, _> = match request.send().await {
            Ok(response) => response.json().await,
            Err(e) => {
                tracing::warn!("Failed to fetch claims for patent {patent_id}: {e}");
                return Vec::new();
            }
        };

        match body {
            Ok(claims) => {
                let mut claims = claims.g_claims;
                claims.sort_by_key(|c| c.claim_sequence.unwrap_or(i64::MAX));
                claims.into_iter().filter_map(|c| c.claim_text).collect()
            }
            Err(e) => {
                tracing::warn!("Claims response for patent {patent_id} invalid: {e}");
                Vec::new()
            }
        }
    }

    /// Optional LLM-written executive summary; the report stands without it.
    async fn summarize(&self, query: &str, report_body: &str) -> Option<String> {
        let llm = self.llm.as_ref()?;

        let prompt = format!(
            "Search query: {query}\n\nSearch results:\n{report_body}\n\n\
             Write a short executive summary (3-6 sentences) of the prior art landscape."
        );

        match llm
            .complete(SUMMARY_SYSTEM_PROMPT, &prompt, CompletionOptions::default())
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Prior art summary generation failed: {e}");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Tool for PriorArtSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Search for prior art patents using the PatentsView API with a comprehensive markdown report"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query describing the invention or technology",
                    "minLength": 3,
                    "maxLength": 1000
                },
                "context": {
                    "type": "string",
                    "description": "Context from the user's document"
                },
                "conversation_history": {
                    "type": "string",
                    "description": "Conversation history context"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of patents to return",
                    "default": DEFAULT_MAX_RESULTS,
                    "minimum": 1,
                    "maximum": 100
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
        let query = str_param(parameters, "query").unwrap_or_default().trim();
        if query.len() < 3 {
            return Err(ToolFailure::new(
                "Query is required and must be at least 3 characters long",
            ));
        }

        let context = str_param(parameters, "context");
        let conversation_history = str_param(parameters, "conversation_history");
        let max_results = u64_param(parameters, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 100);

        tracing::info!(query, "executing prior art search");

        let criteria = self
            .generate_search_queries(query, context, conversation_history)
            .await;

        // Run every query, deduplicating hits by patent id. A single failing
        // query is tolerated; all of them failing is a tool failure.
        let mut patents: Vec<PatentRecord> = Vec::new();
        let mut last_error = None;
        let mut any_succeeded = false;

        for criterion in &criteria {
            match self.search_patents_api(&criterion.query, max_results).await {
                Ok(results) => {
                    any_succeeded = true;
                    for patent in results {
                        if !patents.iter().any(|p| p.patent_id == patent.patent_id) {
                            patents.push(patent);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Patent query failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        if !any_succeeded {
            return Err(last_error
                .unwrap_or_else(|| ToolFailure::retriable("PatentsView API unavailable")));
        }

        patents.truncate(max_results as usize);

        let mut claims_by_patent = Vec::new();
        for patent in patents.iter().take(CLAIMS_FETCH_LIMIT) {
            claims_by_patent.push(self.fetch_patent_claims(&patent.patent_id).await);
        }

        let body = render_report_body(query, &patents, &claims_by_patent, &criteria);
        let summary = self.summarize(query, &body).await;

        let mut report = format!("# Prior Art Search Report\n\n**Query**: {query}\n\n");
        if let Some(summary) = summary {
            report.push_str(&format!("## Executive Summary\n\n{summary}\n\n"));
        }
        report.push_str(&body);

        let results_found = patents.len();
        Ok(ToolOutput::new(report)
            .with_metadata("results_found", json!(results_found))
            .with_metadata("queries_used", json!(criteria.len())))
    }
}

fn query_generation_prompt(
    query: &str,
    context: Option<&str>,
    conversation_history: Option<&str>,
) -> String {
    format!(
        r#"Generate 3-5 PatentsView API search queries for this prior art search.

Invention description: "{query}"
Document context: "{context}"
Conversation history: "{history}"

PatentsView query syntax: a JSON expression over fields "patent_title" and
"patent_abstract", combinable with "_or", "_and", and "_text_any".

Respond with ONLY a JSON object of this shape:
{{
  "search_queries": [
    {{
      "query": {{"_or": [{{"_text_any": {{"patent_title": "terms"}}}}, {{"_text_any": {{"patent_abstract": "terms"}}}}]}},
      "reasoning": "why this query"
    }}
  ]
}}"#,
        context = context.unwrap_or(""),
        history = conversation_history.unwrap_or(""),
    )
}

/// Parse LLM-generated search criteria; `None` rejects the whole reply.
fn parse_generated_criteria(text: &str) -> Option<Vec<SearchCriterion>> {
    let json_str = decode::extract_json_object(text)?;
    let criteria: GeneratedCriteria = serde_json::from_str(json_str).ok()?;

    let queries = criteria.search_queries;
    if queries.len() < 3 || queries.len() > 5 {
        return None;
    }
    if queries.iter().any(|q| !q.query.is_object()) {
        return None;
    }

    Some(queries)
}

/// Deterministic query set used when the LLM is unavailable or unparsable.
fn fallback_queries(query: &str) -> Vec<SearchCriterion> {
    let words: Vec<&str> = query.split_whitespace().collect();

    let mut queries = vec![
        SearchCriterion {
            query: json!({"_text_any": {"patent_abstract": query}}),
            reasoning: format!("Simple abstract search for: {query}"),
        },
        SearchCriterion {
            query: json!({"_text_any": {"patent_title": query}}),
            reasoning: format!("Simple title search for: {query}"),
        },
        SearchCriterion {
            query: json!({"_or": [
                {"_text_any": {"patent_abstract": query}},
                {"_text_any": {"patent_title": query}}
            ]}),
            reasoning: format!("Combined abstract and title search for: {query}"),
        },
    ];

    if words.len() > 1 {
        queries.push(SearchCriterion {
            query: json!({"_text_any": {"patent_abstract": words[0]}}),
            reasoning: format!("First word search: {}", words[0]),
        });
        queries.push(SearchCriterion {
            query: json!({"_text_any": {"patent_abstract": words[words.len() - 1]}}),
            reasoning: format!("Last word search: {}", words[words.len() - 1]),
        });
    }

    queries
}

fn render_report_body(
    query: &str,
    patents: &[PatentRecord],
    claims_by_patent: &[Vec<String>],
    criteria: &[SearchCriterion],
) -> String {
    let mut body = String::new();

    if patents.is_empty() {
        body.push_str("No relevant patents found.\n\n");
    } else {
        body.push_str(&format!("## Patents Found ({})\n\n", patents.len()));
    }

    for (i, patent) in patents.iter().enumerate() {
        body.push_str(&format!(
            "### {}. {} ({})\n",
            i + 1,
            patent.patent_title,
            patent.patent_id
        ));
        if let Some(date) = &patent.patent_date {
            body.push_str(&format!("**Date**: {date}\n"));
        }
        if let Some(abstract_text) = &patent.patent_abstract {
            body.push_str(&format!("**Abstract**: {}\n", truncate(abstract_text, 600)));
        }
        if let Some(claims) = claims_by_patent.get(i) {
            if let Some(first_claim) = claims.first() {
                body.push_str(&format!("**Claim 1**: {}\n", truncate(first_claim, 600)));
            }
        }
        body.push('\n');
    }

    body.push_str(&format!(
        "## Search Strategy\n\nFound {} relevant patents for \"{}\" using {} search strategies.\n\n",
        patents.len(),
        query,
        criteria.len()
    ));
    for (i, criterion) in criteria.iter().enumerate() {
        if !criterion.reasoning.is_empty() {
            body.push_str(&format!("{}. {}\n", i + 1, criterion.reasoning));
        }
    }

    body
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
