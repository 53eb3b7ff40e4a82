//! # Audit Review
//!
//! Summarises a verdict audit log.
//!
//! ## Usage
//!
//! ```bash
//! audit_review vigil-audit.log --top 20
//! audit_review vigil-audit.log --player 42
//! audit_review vigil-audit.log --player 42 --replay > player42.jsonl
//! audit_review vigil-audit.log --json
//! ```

use std::process::ExitCode;
use vigil_audit::{AuditKind, AuditReader, AuditSummary};
use vigil_shared::PlayerId;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut path: Option<String> = None;
    let mut top = 10usize;
    let mut player: Option<PlayerId> = None;
    let mut json = false;
    let mut replay = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--top" | "-t" => {
                if i + 1 < args.len() {
                    top = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--player" | "-p" => {
                if i + 1 < args.len() {
                    player = args[i + 1].parse().ok().map(PlayerId);
                    i += 1;
                }
            }
            "--json" => json = true,
            "--replay" | "-r" => replay = true,
            "--help" | "-h" => {
                println!("Usage: audit_review <LOG> [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -t, --top <N>          Players to list (default: 10)");
                println!("  -p, --player <ID>      Print every record of one player");
                println!("      --json             Print the summary as JSON");
                println!("  -r, --replay           With --player: captured events as JSON lines");
                println!("  -h, --help             Show this help");
                return ExitCode::SUCCESS;
            }
            other => path = Some(other.to_owned()),
        }
        i += 1;
    }

    let Some(path) = path else {
        eprintln!("audit_review: missing log path (see --help)");
        return ExitCode::FAILURE;
    };
    let reader = match AuditReader::open(&path) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("audit_review: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(player) = player {
        return print_player(reader, player, replay);
    }

    let mut reader = reader;
    let mut summary = AuditSummary::collect(reader.by_ref());
    summary.torn_tail = reader.has_torn_tail();

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("audit_review: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&path, &summary, top);
    }

    if summary.corruption.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_summary(path: &str, summary: &AuditSummary, top: usize) {
    println!("┌─ AUDIT LOG ─────────────────────────────────────────────────────┐");
    println!("│ File:     {path}");
    println!("│ Records:  {}", summary.records);
    println!("│ Players:  {}", summary.players.len());
    if summary.torn_tail {
        println!("│ Tail:     partial record ignored");
    }
    if let Some(corruption) = &summary.corruption {
        println!("│ CORRUPT:  {corruption}");
    }
    println!("└─────────────────────────────────────────────────────────────────┘");
    println!();
    println!("{:<16} {:>8} {:>8} {:>8} {:>10}", "CHECK", "FLAGS", "VERDICTS", "PLAYERS", "MAX LEVEL");
    for (name, check) in &summary.checks {
        println!(
            "{name:<16} {:>8} {:>8} {:>8} {:>10.2}",
            check.flags,
            check.verdicts,
            check.players.len(),
            check.max_level
        );
    }
    println!();
    println!("{:<12} {:>8} {:>8}  CHECKS", "PLAYER", "FLAGS", "VERDICTS");
    for (id, player) in summary.worst_players(top) {
        let checks: Vec<&str> = player.checks.iter().map(String::as_str).collect();
        println!("{:<12} {:>8} {:>8}  {}", id.to_string(), player.flags, player.verdicts, checks.join(","));
    }
}

fn print_player<R: std::io::Read>(reader: AuditReader<R>, player: PlayerId, replay: bool) -> ExitCode {
    let mut status = ExitCode::SUCCESS;
    for record in reader {
        match record {
            Ok(record) if record.player == player && replay => {
                for event in &record.replay {
                    match serde_json::to_string(event) {
                        Ok(line) => println!("{line}"),
                        Err(err) => {
                            eprintln!("audit_review: {err}");
                            status = ExitCode::FAILURE;
                        }
                    }
                }
            }
            Ok(record) if record.player == player => {
                let kind = match record.kind {
                    AuditKind::Flagged => "FLAG   ",
                    AuditKind::Verdict => "VERDICT",
                };
                let evidence: Vec<String> = record.evidence.iter().map(|(k, v)| format!("{k}={v:.3}")).collect();
                println!(
                    "{} {kind} {:<12} level={:<7.2} replay={:<4} {}",
                    record.timestamp,
                    record.check,
                    record.level,
                    record.replay.len(),
                    evidence.join(" ")
                );
            }
            Ok(_) => {}
            Err(err) => {
                eprintln!("audit_review: {err}");
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}
