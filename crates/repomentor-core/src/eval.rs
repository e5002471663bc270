//! Answer-quality evaluation: ask a fixed set of questions against an ingested
//! session and have the model grade each answer on a 1–5 scale.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::provider::{Embedder, Generator};
use crate::session::Session;

/// Answers slower than this are flagged in the summary.
pub const LATENCY_THRESHOLD: Duration = Duration::from_secs(3);
/// Grades at or above this count as a pass.
pub const PASS_SCORE: u8 = 4;

/// One question and the keywords a good answer should mention.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvalCase {
    pub question: String,
    #[serde(default)]
    pub expected: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CaseFile {
    #[serde(default)]
    case: Vec<EvalCase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub question: String,
    pub score: u8,
    pub latency_secs: f64,
    pub sources_count: usize,
    pub keywords_found: usize,
}

impl EvalResult {
    pub fn passed(&self) -> bool {
        self.score >= PASS_SCORE
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub average_score: f64,
    pub average_latency_secs: f64,
    pub slow_answers: usize,
    pub results: Vec<EvalResult>,
}

/// Read `[[case]]` tables from a TOML file.
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>, EvalError> {
    let s = std::fs::read_to_string(path).map_err(EvalError::Read)?;
    parse_cases(&s)
}

fn parse_cases(s: &str) -> Result<Vec<EvalCase>, EvalError> {
    let file: CaseFile = toml::from_str(s)?;
    if file.case.is_empty() {
        return Err(EvalError::NoCases);
    }
    Ok(file.case)
}

pub fn grading_prompt(question: &str, answer: &str, expected: &[String]) -> String {
    format!(
        "You are a strict code reviewer. Rate this answer from 1 to 5.

Question: {question}
System Answer: {answer}
Expected Keywords/Concepts: {expected:?}

Criteria:
1: Wrong or irrelevant.
3: Partially correct but missing details.
5: Perfect, accurate, and mentions expected concepts.

OUTPUT ONLY THE NUMBER (e.g., 5). Do not write words.
"
    )
}

/// First run of digits in a grader reply, clamped to 1–5. Anything unparsable is 1.
pub fn parse_score(reply: &str) -> u8 {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u8>().map_or(1, |n| n.clamp(1, 5))
}

/// Expected keywords appearing verbatim in `answer`.
pub fn keywords_found(answer: &str, expected: &[String]) -> usize {
    expected.iter().filter(|k| answer.contains(k.as_str())).count()
}

/// Ask and grade every case in order, pausing `pause` between cases.
pub async fn evaluate<E: Embedder, G: Generator>(
    session: &Session,
    cases: &[EvalCase],
    embedder: &E,
    generator: &G,
    top_k: usize,
    pause: Duration,
) -> EvalSummary {
    let mut results = Vec::with_capacity(cases.len());
    for (i, case) in cases.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        let start = Instant::now();
        let answer = session.ask(&case.question, embedder, generator, top_k).await;
        let latency = start.elapsed();

        let prompt = grading_prompt(&case.question, &answer.text, &case.expected);
        let score = match generator.generate(&prompt).await {
            Ok(reply) => parse_score(&reply),
            Err(e) => {
                tracing::warn!("grading failed: {e}");
                1
            }
        };
        tracing::info!(case = i + 1, score, latency_ms = latency.as_millis() as u64, "graded");
        results.push(EvalResult {
            question: case.question.clone(),
            score,
            latency_secs: latency.as_secs_f64(),
            sources_count: answer.sources.len(),
            keywords_found: keywords_found(&answer.text, &case.expected),
        });
    }
    summarize(results)
}

pub fn summarize(results: Vec<EvalResult>) -> EvalSummary {
    let n = results.len().max(1) as f64;
    EvalSummary {
        average_score: results.iter().map(|r| f64::from(r.score)).sum::<f64>() / n,
        average_latency_secs: results.iter().map(|r| r.latency_secs).sum::<f64>() / n,
        slow_answers: results
            .iter()
            .filter(|r| r.latency_secs > LATENCY_THRESHOLD.as_secs_f64())
            .count(),
        results,
    }
}

/// Write the per-case results as pretty JSON.
pub fn write_report(summary: &EvalSummary, path: &Path) -> Result<(), EvalError> {
    let json = serde_json::to_string_pretty(&summary.results)?;
    std::fs::write(path, json).map_err(EvalError::Write)
}

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("failed to read cases: {0}")]
    Read(std::io::Error),
    #[error("invalid cases file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cases file has no [[case]] entries")]
    NoCases,
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write report: {0}")]
    Write(std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::acquire::Source;
    use crate::index::IngestConfig;
    use crate::provider::testing::{HashEmbedder, StaticGenerator};

    #[test]
    fn scores_are_parsed_leniently() {
        assert_eq!(parse_score("5"), 5);
        assert_eq!(parse_score("**4**"), 4);
        assert_eq!(parse_score("Score: 3."), 3);
        assert_eq!(parse_score("nine"), 1);
        assert_eq!(parse_score("10"), 5);
        assert_eq!(parse_score("0"), 1);
    }

    #[test]
    fn cases_parse_from_toml() {
        let cases = parse_cases(
            "[[case]]\nquestion = \"What embedding model is used?\"\nexpected = [\"nomic-embed-text\"]\n\n\
             [[case]]\nquestion = \"How are chunks created?\"\n",
        )
        .unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].expected, vec!["nomic-embed-text"]);
        assert!(cases[1].expected.is_empty());
        assert!(matches!(parse_cases(""), Err(EvalError::NoCases)));
    }

    #[test]
    fn keyword_hits_are_verbatim() {
        let expected = vec!["chunk_source".to_string(), "Chroma".to_string()];
        assert_eq!(keywords_found("calls chunk_source per file", &expected), 1);
    }

    #[test]
    fn summary_averages_and_flags_slow_answers() {
        let result = |score, latency_secs| EvalResult {
            question: "q".into(),
            score,
            latency_secs,
            sources_count: 1,
            keywords_found: 0,
        };
        let summary = summarize(vec![result(5, 1.0), result(2, 4.0)]);
        assert_eq!(summary.average_score, 3.5);
        assert_eq!(summary.average_latency_secs, 2.5);
        assert_eq!(summary.slow_answers, 1);
        assert!(summary.results[0].passed());
        assert!(!summary.results[1].passed());
    }

    #[tokio::test]
    async fn evaluate_grades_each_case() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("config.py"), "def model():\n    return 'nomic-embed-text'\n").unwrap();
        let mut session = Session::create_in(&tmp.path().join("sessions"));
        let embedder = HashEmbedder::default();
        session
            .prepare(&Source::Directory(repo), &embedder, &IngestConfig::default())
            .await
            .unwrap();

        let cases = vec![EvalCase {
            question: "What embedding model is used?".into(),
            expected: vec!["5".into()],
        }];
        let generator = StaticGenerator::replying("5");
        let summary = evaluate(&session, &cases, &embedder, &generator, 7, Duration::ZERO).await;
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].score, 5);
        assert_eq!(summary.results[0].sources_count, 1);
        assert_eq!(summary.results[0].keywords_found, 1);

        let report = tmp.path().join("report.json");
        write_report(&summary, &report).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(report).unwrap()).unwrap();
        assert_eq!(parsed[0]["score"], 5);
    }
}
