use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use mastery_engine::config::Config;
use mastery_engine::logging;
use mastery_engine::mastery::grade::parse_grade;
use mastery_engine::services::practice::{PracticeError, PracticeService};
use mastery_engine::store::file::JsonFileProfileStore;
use mastery_engine::store::memory::{MemoryAttemptHistory, MemoryCorpus};

const USAGE: &str = "usage: mastery-engine replay <attempts.jsonl>";

/// One line of a replay file. Either `score` (0-1) or `grade` ("7/10") is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayLine {
    student_id: String,
    question_id: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    grade: Option<String>,
    #[serde(default, alias = "skills_tested")]
    skills_tested: Value,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_tracing(&config.log_level, config.log_dir.as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = match args.as_slice() {
        [command, path] if command == "replay" => path.clone(),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match replay(&config, Path::new(&path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "replay failed");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("cannot read {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error(transparent)]
    Practice(#[from] PracticeError),
    #[error("cannot print profile: {0}")]
    Output(#[from] serde_json::Error),
}

fn replay(config: &Config, path: &Path) -> Result<(), ReplayError> {
    let file = File::open(path).map_err(|e| ReplayError::Io(path.display().to_string(), e))?;
    let service = PracticeService::new(
        Arc::new(JsonFileProfileStore::new(config.profile_dir.clone())),
        Arc::new(MemoryCorpus::default()),
        Arc::new(MemoryAttemptHistory::new()),
        config.engine.clone(),
    );
    tracing::info!(path = %path.display(), profile_dir = %config.profile_dir.display(), "replaying attempts");

    let mut students = BTreeSet::new();
    let mut applied = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ReplayError::Io(path.display().to_string(), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ReplayLine = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(line = index + 1, error = %err, "skipping malformed line");
                continue;
            }
        };

        let score = match (entry.score, entry.grade.as_deref()) {
            (Some(score), _) => score.clamp(0.0, 1.0),
            (None, Some(grade)) => match parse_grade(grade) {
                Ok(score) => score,
                Err(err) => {
                    tracing::warn!(line = index + 1, error = %err, "skipping ungradable line");
                    continue;
                }
            },
            (None, None) => {
                tracing::warn!(line = index + 1, "line has neither score nor grade");
                continue;
            }
        };

        let timestamp = entry.timestamp.unwrap_or_else(Utc::now);
        let recorded = match service.record_scored_at(
            &entry.student_id,
            &entry.question_id,
            score,
            &entry.skills_tested,
            timestamp,
        ) {
            Ok(recorded) => recorded,
            Err(err) if err.is_per_attempt() => {
                tracing::warn!(line = index + 1, student_id = %entry.student_id, error = %err, "skipping attempt");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if !recorded.outcome.is_noop() {
            applied += 1;
        }
        students.insert(entry.student_id);
    }

    tracing::info!(applied, students = students.len(), "replay finished");
    for student_id in &students {
        let profile = service.load_profile(student_id)?;
        let patterns = service.learning_patterns(student_id, u32::MAX)?;
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "studentId": student_id,
            "profile": profile,
            "patterns": patterns,
        }))?);
    }
    Ok(())
}
