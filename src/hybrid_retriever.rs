//! Hybrid Retriever (C8): classifies intent, fans out across the
//! lexical, vector, and graph sources, fuses and cites the results.

use crate::errors::CancellationToken;
use crate::graph::store::GraphStore;
use crate::graph::GraphQuery;
use crate::lexical_index_manager::LexicalIndexManager;
use crate::types::{EntityId, ValidatedSearchQuery};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    Received,
    IntentClassified,
    Fanout,
    Fused,
    Cited,
    Responded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Lookup,
    Semantic,
    CallGraph,
    FilePath,
    Regex,
}

static QUOTED_SUBSTRING: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]+""#).unwrap());
static REGEX_METACHARACTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\\^$.|?*+()\[\]{}]").unwrap());
static CALL_GRAPH_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(callers?|callees?|calls|who calls|invoked by)\b").unwrap());

/// Cheap heuristics over the raw query text (§4.8): presence of
/// identifiers, quoted substrings, path separators, regex
/// metacharacters.
pub fn classify_intent(query: &str) -> Intent {
    if CALL_GRAPH_HINT.is_match(query) {
        Intent::CallGraph
    } else if query.contains('/') && !query.contains(' ') {
        Intent::FilePath
    } else if REGEX_METACHARACTERS.is_match(query) {
        Intent::Regex
    } else if QUOTED_SUBSTRING.is_match(query) {
        Intent::Lookup
    } else {
        Intent::Semantic
    }
}

#[derive(Debug, Clone)]
pub struct Citation {
    pub file_path: String,
    pub entity_id: Option<EntityId>,
    pub snippet: String,
    pub sources: Vec<&'static str>,
    pub score: f64,
    pub purpose_summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetrievalResponse {
    pub state: QueryState,
    pub intent: Intent,
    pub hits: Vec<Citation>,
    pub partial: bool,
}

/// Tag-conditioned fusion weights `(lexical, vector, graph)`.
fn fusion_weights(intent: Intent) -> (f64, f64, f64) {
    match intent {
        Intent::Lookup => (0.7, 0.2, 0.1),
        Intent::Semantic => (0.2, 0.7, 0.1),
        Intent::CallGraph => (0.1, 0.1, 0.8),
        Intent::FilePath => (0.9, 0.05, 0.05),
        Intent::Regex => (0.8, 0.1, 0.1),
    }
}

fn normalize(scores: &mut [f64]) {
    let max = scores.iter().cloned().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for s in scores.iter_mut() {
            *s /= max;
        }
    }
}

pub struct HybridRetriever<S: GraphStore> {
    store: S,
    lexical: LexicalIndexManager,
}

impl<S: GraphStore> HybridRetriever<S> {
    pub fn new(store: S, lexical: LexicalIndexManager) -> Self {
        Self { store, lexical }
    }

    pub async fn retrieve(
        &self,
        query: &ValidatedSearchQuery,
        embedding: Option<&[f32]>,
        cancellation: &CancellationToken,
        return_partial_on_cancel: bool,
    ) -> anyhow::Result<RetrievalResponse> {
        cancellation.check("retrieve:received")?;
        let intent = classify_intent(query.as_str());
        cancellation.check("retrieve:intent_classified")?;

        let (w_lex, w_vec, w_graph) = fusion_weights(intent);
        let mut candidates: Vec<Citation> = Vec::new();
        let mut partial = false;

        if w_lex > 0.0 {
            if cancellation.is_cancelled() {
                partial = true;
            } else {
                let lexical_hits = self.lexical.search(query.as_str(), 20, None).await;
                let mut scores: Vec<f64> = (0..lexical_hits.matches.len()).map(|i| (20 - i.min(20)) as f64).collect();
                normalize(&mut scores);
                for (hit, score) in lexical_hits.matches.iter().zip(scores) {
                    let line = hit.line_matches.first();
                    candidates.push(Citation {
                        file_path: hit.file_name.clone(),
                        entity_id: None,
                        snippet: line.map(|l| l.line.clone()).unwrap_or_default(),
                        sources: vec!["lexical"],
                        score: score * w_lex,
                        purpose_summary: None,
                    });
                }
            }
        }

        if w_vec > 0.0 {
            if let Some(vector) = embedding {
                if cancellation.is_cancelled() {
                    partial = true;
                } else {
                    let hits = self.store.vector_search(vector, 20).await?;
                    let mut scores: Vec<f64> = hits.iter().map(|h| 1.0 / (1.0 + h.distance as f64)).collect();
                    normalize(&mut scores);
                    for (hit, score) in hits.iter().zip(scores) {
                        candidates.push(Citation {
                            file_path: String::new(),
                            entity_id: Some(hit.id.clone()),
                            snippet: hit.id.to_string(),
                            sources: vec!["vector"],
                            score: score * w_vec,
                            purpose_summary: None,
                        });
                    }
                }
            }
        }

        if w_graph > 0.0 && intent == Intent::CallGraph {
            if cancellation.is_cancelled() {
                partial = true;
            } else if let Some(entity_text) = extract_quoted_or_last_token(query.as_str()) {
                let entity_id = EntityId::new(entity_text);
                let rows = self.store.query(GraphQuery::CallersOf(entity_id.clone())).await?;
                let mut scores: Vec<f64> = vec![1.0; rows.calls.len()];
                normalize(&mut scores);
                for (edge, score) in rows.calls.iter().zip(scores) {
                    candidates.push(Citation {
                        file_path: String::new(),
                        entity_id: Some(edge.caller_id.clone()),
                        snippet: edge.callee_text.clone(),
                        sources: vec!["graph"],
                        score: score * w_graph,
                        purpose_summary: None,
                    });
                }
            }
        }

        if cancellation.is_cancelled() && !return_partial_on_cancel {
            return Ok(RetrievalResponse {
                state: QueryState::Fanout,
                intent,
                hits: Vec::new(),
                partial: true,
            });
        }

        let mut fused = fuse_and_dedup(candidates);
        if !cancellation.is_cancelled() {
            self.attach_justifications(&mut fused).await?;
        }

        Ok(RetrievalResponse {
            state: QueryState::Responded,
            intent,
            hits: fused,
            partial,
        })
    }

    /// Justification lookup (C8): for every surviving hit with a known
    /// `entity_id`, pull its `JustificationRow` (if any analysis pass has
    /// produced one) and attach the summary to the citation.
    async fn attach_justifications(&self, hits: &mut [Citation]) -> anyhow::Result<()> {
        for hit in hits.iter_mut() {
            let Some(entity_id) = hit.entity_id.clone() else {
                continue;
            };
            let rows = self.store.query(GraphQuery::JustificationFor(entity_id)).await?;
            if let Some(row) = rows.justifications.into_iter().next() {
                hit.purpose_summary = Some(row.purpose_summary);
            }
        }
        Ok(())
    }
}

fn fuse_and_dedup(mut candidates: Vec<Citation>) -> Vec<Citation> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut seen: HashSet<(String, String)> = HashSet::new();
    candidates.retain(|c| {
        let key = (
            c.file_path.clone(),
            c.entity_id.as_ref().map(|e| e.as_str().to_string()).unwrap_or_default(),
        );
        seen.insert(key)
    });
    candidates
}

fn extract_quoted_or_last_token(query: &str) -> Option<String> {
    if let Some(caps) = QUOTED_SUBSTRING.find(query) {
        return Some(caps.as_str().trim_matches('"').to_string());
    }
    query.split_whitespace().last().map(|s| s.to_string())
}
