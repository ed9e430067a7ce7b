//! Replay CLI: feeds recorded pose frames (JSON Lines) through one session.
//!
//! Usage: rep_tracker [frames.jsonl] [exercise]

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use anyhow::{Context, Result};
use rep_tracker::catalog::Catalog;
use rep_tracker::config::Config;
use rep_tracker::pose::PoseFrame;
use rep_tracker::session::Session;

const CONFIG_PATH: &str = "config.toml";

fn load_catalog(config: &Config) -> Result<Catalog> {
    match &config.catalog.path {
        Some(path) => Catalog::load(path).with_context(|| format!("failed to load catalog {}", path)),
        None => Ok(Catalog::builtin()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_PATH);
    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| config.session.input.clone());
    let exercise = args.next().unwrap_or_else(|| config.session.exercise.clone());

    let catalog = load_catalog(&config)?;
    let exercise_config = catalog.get(&exercise)?;

    eprintln!("=== Rep Tracker - Replay ===");
    eprintln!("種目: {} ({})", exercise_config.display_name(), exercise);
    eprintln!("入力: {}", input);

    let mut session = Session::new(exercise_config)?;
    let reader = BufReader::new(
        File::open(&input).with_context(|| format!("failed to open {}", input))?,
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: PoseFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("{}:{}: {}", input, line_no + 1, e);
                skipped += 1;
                continue;
            }
        };
        let result = session.ingest_frame(&frame);
        if config.session.print_frames {
            writeln!(out, "{}", serde_json::to_string(&result)?)?;
        }
    }

    let summary = session.summary();
    writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
    if skipped > 0 {
        eprintln!("{} 行をスキップしました", skipped);
    }
    eprintln!(
        "完了: {} レップ / {:.1}秒 / 平均スコア {:.1} ({})",
        summary.total_reps, summary.duration_seconds, summary.average_form_score, summary.performance_grade
    );
    Ok(())
}
