use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use seis_history::ActionDescription;
use seis_sdk::{Workspace, WorkspaceConfig};
use seis_types::{Detection, DetectionRevision, Entity, EntityId, EntityKind};

use crate::cli::*;
use crate::script::{Runner, Script, SessionState};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Replay(args) => cmd_replay(args, config, cli.format, cli.verbose),
        Command::Demo(args) => cmd_demo(args, config),
        Command::Config => cmd_config(&config, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WorkspaceConfig> {
    let Some(path) = path else {
        return Ok(WorkspaceConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    WorkspaceConfig::from_toml_str(&text)
        .with_context(|| format!("cannot parse config {}", path.display()))
}

fn cmd_replay(
    args: ReplayArgs,
    config: WorkspaceConfig,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("cannot read script {}", args.script.display()))?;
    let script = Script::from_json(&text)?;

    let mut runner = Runner::new(Workspace::with_config(config));
    let reports = runner.run(script)?;
    let sessions = runner.sessions()?;

    if format == OutputFormat::Json {
        let out = serde_json::json!({ "steps": reports, "sessions": sessions });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for report in &reports {
        let marker = if report.history.is_some() { "+" } else { "✓" };
        println!("{} {:>3}  {}", marker.green().bold(), report.index, report.summary);
    }
    println!();
    for state in &sessions {
        print_session(state, verbose);
    }
    Ok(())
}

fn print_session(state: &SessionState, verbose: bool) {
    println!(
        "{} {}: {} events, {} detections, {} history entries",
        "Session".bold(),
        state.user.yellow().bold(),
        state.events.len(),
        state.detections.len(),
        state.history.len()
    );
    for sd in &state.detections {
        let Some(rev) = sd.current_revision() else {
            continue;
        };
        let conflict = if state.conflicted_detections.contains(&sd.id) {
            " conflict".red().to_string()
        } else {
            String::new()
        };
        let modified = if sd.is_modified() { " *".cyan().to_string() } else { String::new() };
        println!(
            "  {} {} {} @ {:.3}{modified}{conflict}",
            sd.id.short_id().dimmed(),
            sd.station,
            rev.phase.bold(),
            rev.arrival_time
        );
    }
    if verbose {
        for entry in &state.history {
            let status = if entry.is_applied() {
                "applied".green()
            } else {
                "undone".dimmed()
            };
            println!("  {} {} [{}]", entry.id.short_id().yellow(), entry.action, status);
            for change in &entry.changes {
                println!("      {}", change.descriptor);
            }
        }
    }
}

fn cmd_demo(args: DemoArgs, config: WorkspaceConfig) -> anyhow::Result<()> {
    let mut ws = Workspace::with_config(config);
    let id = EntityId::new();
    let detection = Detection::new(
        id,
        args.station.clone(),
        DetectionRevision::new(id, args.from.clone(), 36_000.0),
    );
    ws.admit_detections(vec![detection.clone()])?;
    let alice = ws.open_session("alice")?;
    let bob = ws.open_session("bob")?;
    println!("{} Admitted {} on {}", "✓".green().bold(), args.from.bold(), args.station);

    let mut edited = detection;
    let Some(mut rev) = edited.current_revision().map(|r| r.successor()) else {
        anyhow::bail!("detection has no current revision");
    };
    rev.phase = args.to.clone();
    edited.revise(rev);
    ws.session_mut(&alice)?
        .set_detections(ActionDescription::UpdateDetectionRePhase, vec![edited])?;
    report_phase(&ws, "alice re-phased", &alice, &id)?;
    report_phase(&ws, "bob still sees", &bob, &id)?;

    ws.session_mut(&alice)?.undo_for(None, 1)?;
    report_phase(&ws, "alice undid", &alice, &id)?;
    ws.session_mut(&alice)?.redo(1)?;
    report_phase(&ws, "alice redid", &alice, &id)?;
    for entry in ws.session(&alice)?.get_history() {
        for change in &entry.changes {
            println!("  {} {}", entry.id.short_id().yellow(), change.descriptor);
        }
    }

    let report = ws.commit(&alice, EntityKind::Detection, None)?;
    println!(
        "{} Committed {} detection(s), {} session(s) notified",
        "✓".green().bold(),
        report.detections.len(),
        report.notified_sessions
    );
    report_phase(&ws, "bob now sees", &bob, &id)?;

    Ok(())
}

fn report_phase(
    ws: &Workspace,
    label: &str,
    session: &seis_types::SessionId,
    id: &EntityId,
) -> anyhow::Result<()> {
    let cache = ws.session(session)?;
    let detection = cache
        .get_detection(id)?
        .with_context(|| format!("detection {} vanished", id.short_id()))?;
    let phase = detection
        .current_revision()
        .map(|r| r.phase.clone())
        .unwrap_or_default();
    let modified = if cache.is_modified(EntityKind::Detection, id) {
        " (uncommitted)".cyan().to_string()
    } else {
        String::new()
    };
    println!("  {label}: {}{modified}", phase.bold());
    Ok(())
}

fn cmd_config(config: &WorkspaceConfig, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }
    println!("broadcast_overwrite = {}", config.broadcast_overwrite);
    println!("enforce_conflict_lock = {}", config.cache.enforce_conflict_lock);
    println!("non_undoable:");
    for action in &config.cache.non_undoable {
        println!("  {} {}", "-".dimmed(), action);
    }
    Ok(())
}
