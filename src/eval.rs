//! Retrieval quality metrics over any [`Searcher`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::engine::Searcher;
use crate::error::EngineError;

/// Cutoff used for both metrics.
pub const EVAL_CUTOFF: usize = 5;

/// A query with the corpus positions judged relevant to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalQuery {
    pub query: String,
    pub relevant: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryScore {
    pub query: String,
    pub reciprocal_rank: f64,
    pub precision_at_5: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    #[serde(rename = "MRR")]
    pub mrr: f64,
    #[serde(rename = "Precision@5")]
    pub precision_at_5: f64,
    pub queries: usize,
    pub per_query: Vec<QueryScore>,
}

/// Mean reciprocal rank and mean precision at 5.
///
/// Precision always divides by the cutoff, even when fewer hits come back.
/// An empty query set scores zero on both metrics.
pub fn evaluate<S>(searcher: &S, queries: &[EvalQuery]) -> Result<EvalReport, EngineError>
where
    S: Searcher + ?Sized,
{
    let mut per_query = Vec::with_capacity(queries.len());
    for q in queries {
        let hits = searcher.search(&q.query, EVAL_CUTOFF)?;
        let retrieved: Vec<usize> = hits.iter().map(|h| h.document_index).collect();
        per_query.push(QueryScore {
            query: q.query.clone(),
            reciprocal_rank: reciprocal_rank(&retrieved, &q.relevant),
            precision_at_5: precision_at(&retrieved, &q.relevant, EVAL_CUTOFF),
        });
    }

    let n = per_query.len();
    let mean = |f: fn(&QueryScore) -> f64| {
        if n == 0 {
            0.0
        } else {
            per_query.iter().map(f).sum::<f64>() / n as f64
        }
    };
    let report = EvalReport {
        mrr: mean(|s| s.reciprocal_rank),
        precision_at_5: mean(|s| s.precision_at_5),
        queries: n,
        per_query,
    };
    info!(
        queries = report.queries,
        mrr = report.mrr,
        precision_at_5 = report.precision_at_5,
        "evaluation_finished"
    );
    Ok(report)
}

fn reciprocal_rank(retrieved: &[usize], relevant: &[usize]) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id))
        .map_or(0.0, |pos| 1.0 / (pos + 1) as f64)
}

fn precision_at(retrieved: &[usize], relevant: &[usize], k: usize) -> f64 {
    let relevant: HashSet<usize> = relevant.iter().copied().collect();
    let hits: HashSet<usize> = retrieved
        .iter()
        .take(k)
        .copied()
        .filter(|id| relevant.contains(id))
        .collect();
    hits.len() as f64 / k as f64
}
