//! Command-line interface over the team store.
//!
//! Each invocation resolves the storage root, builds a per-team context, runs
//! one operation, and prints a human-readable summary. Diagnostics go to
//! stderr via tracing so stdout stays scriptable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agent_teams::debate::{
    add_position, decide_debate, list_debates, orchestrate, show_debate, start_debate, Debate,
    DecideArgs, OrchestrateArgs, StartDebateArgs,
};
use agent_teams::lock::{LockConfig, SystemProcessProbe};
use agent_teams::mailbox::{broadcast, inbox, send_message};
use agent_teams::monitor::{build_report, MonitorLogger, MONITOR_LOG_FILE};
use agent_teams::registry::{init_team, UNASSIGNED};
use agent_teams::rootdir::{resolve_root, resolve_root_for_init, RealFs};
use agent_teams::store::{TeamContext, TeamStore};
use agent_teams::tasks::{
    add_task, claim, list_tasks, update_task, AddTaskArgs, TaskStatus, UpdateTaskArgs,
};

#[derive(Parser)]
#[command(name = "agent-teams", version, about = "File-backed coordination for agent teams")]
struct Cli {
    /// Team name.
    #[arg(long, global = true, default_value = "default")]
    team: String,

    /// Explicit storage root; disables ancestor discovery.
    #[arg(long, global = true, env = "AGENT_TEAMS_ROOT")]
    root: Option<PathBuf>,

    /// Seconds a mutating command may wait for the team lock.
    #[arg(long, global = true, env = "AGENT_TEAMS_LOCK_WAIT_SECS")]
    lock_wait_secs: Option<u64>,

    /// Seconds after which a held lock is reported as stale (informational).
    #[arg(long, global = true, env = "AGENT_TEAMS_LOCK_STALE_SECS")]
    lock_stale_secs: Option<u64>,

    /// Emit monitor events for this invocation. The env form accepts
    /// 1/0 and true/false.
    #[arg(
        long,
        global = true,
        env = "AGENT_TEAMS_MONITOR",
        value_parser = clap::builder::BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        default_value = "false"
    )]
    monitor: bool,

    /// Monitor log path; defaults to monitor.jsonl under the storage root.
    #[arg(long, global = true, env = "AGENT_TEAMS_MONITOR_LOG")]
    monitor_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the team (idempotent) or reset its shared state.
    Init {
        /// Team goal, recorded once at creation.
        #[arg(long)]
        goal: String,
        /// Roster member; repeatable.
        #[arg(long = "member", required = true)]
        members: Vec<String>,
        /// Discard tasks, mailbox, and debates and re-seed.
        #[arg(long)]
        reset: bool,
    },
    /// Add a task to the board.
    AddTask {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = UNASSIGNED)]
        owner: String,
        #[arg(long, default_value = "pending")]
        status: TaskStatus,
        /// Task id this depends on; repeatable.
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },
    /// Claim a task: owner and in_progress in one step.
    Claim {
        task_id: String,
        member: String,
    },
    /// Update a task's status, owner, dependencies, or append a note.
    UpdateTask {
        task_id: String,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long = "depends-on")]
        depends_on: Option<Vec<String>>,
    },
    /// List the task board.
    ListTasks,
    /// Send a direct message.
    Message {
        from: String,
        to: String,
        body: String,
    },
    /// Broadcast to every member.
    Broadcast {
        from: String,
        body: String,
    },
    /// Read a member's inbox, oldest first.
    Inbox {
        member: String,
    },
    /// Open a debate.
    StartDebate {
        #[arg(long)]
        topic: String,
        /// Candidate option; repeatable, at least two.
        #[arg(long = "option", required = true)]
        options: Vec<String>,
        /// Participating member; repeatable, at least two.
        #[arg(long = "member", required = true)]
        members: Vec<String>,
        #[arg(long)]
        decider: Option<String>,
        /// Task the decision will be applied to.
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Record or replace a member's position.
    AddPosition {
        debate_id: String,
        member: String,
        option: String,
        /// Confidence in [0, 1].
        confidence: f64,
        rationale: String,
    },
    /// Decide a debate; optionally apply in the same step.
    DecideDebate {
        debate_id: String,
        /// Winner; derived from positions by weighted vote when omitted.
        #[arg(long)]
        option: Option<String>,
        #[arg(long)]
        rationale: String,
        /// Refuse to decide until every member has a position.
        #[arg(long)]
        require_all_positions: bool,
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        status_on_apply: Option<TaskStatus>,
        /// option:member pairs, comma separated.
        #[arg(long)]
        owner_map: Option<String>,
    },
    /// Show one debate as JSON.
    ShowDebate {
        debate_id: String,
    },
    /// List debates.
    ListDebates,
    /// Drive a debate one step: remind, or decide and apply.
    OrchestrateDebate {
        #[arg(long)]
        debate_id: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long = "option")]
        options: Vec<String>,
        #[arg(long = "member")]
        members: Vec<String>,
        #[arg(long)]
        decider: Option<String>,
        #[arg(long)]
        task_id: Option<String>,
        /// Fail instead of reminding when positions are missing.
        #[arg(long)]
        no_reminders: bool,
        #[arg(long)]
        status_on_apply: Option<TaskStatus>,
        #[arg(long)]
        owner_map: Option<String>,
    },
    /// Summarize the monitor log for this team.
    MonitorReport,
}

impl Command {
    /// Label recorded in monitor events.
    fn label(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::AddTask { .. } => "add-task",
            Self::Claim { .. } => "claim",
            Self::UpdateTask { .. } => "update-task",
            Self::ListTasks => "list-tasks",
            Self::Message { .. } => "message",
            Self::Broadcast { .. } => "broadcast",
            Self::Inbox { .. } => "inbox",
            Self::StartDebate { .. } => "start-debate",
            Self::AddPosition { .. } => "add-position",
            Self::DecideDebate { .. } => "decide-debate",
            Self::ShowDebate { .. } => "show-debate",
            Self::ListDebates => "list-debates",
            Self::OrchestrateDebate { .. } => "orchestrate-debate",
            Self::MonitorReport => "monitor-report",
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let fs_probe = RealFs;
    let resolved = match cli.command {
        Command::Init { .. } => resolve_root_for_init(cli.root.as_deref(), &cwd, &fs_probe)?,
        _ => resolve_root(cli.root.as_deref(), &cwd, &cli.team, &fs_probe)?,
    };

    let store = TeamStore::new(&resolved.path, &cli.team)?;
    let mut lock = LockConfig::default();
    if let Some(secs) = cli.lock_wait_secs {
        lock.wait_budget = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.lock_stale_secs {
        lock.stale_window = Duration::from_secs(secs);
    }

    let monitor_path = cli
        .monitor_log
        .clone()
        .unwrap_or_else(|| resolved.path.join(MONITOR_LOG_FILE));
    let monitor = if cli.monitor {
        MonitorLogger::new(&monitor_path, cli.command.label(), &cli.team)
    } else {
        MonitorLogger::disabled()
    };
    let probe = SystemProcessProbe;
    let ctx = TeamContext::new(&store, lock, &probe, &monitor);

    match cli.command {
        Command::Init {
            goal,
            members,
            reset,
        } => {
            let outcome = init_team(&ctx, &goal, &members, reset)?;
            let verb = if outcome.created { "initialized" } else { "already exists" };
            println!(
                "team '{}' {verb} ({} members)",
                outcome.record.team_name,
                outcome.record.members.len()
            );
            if outcome.recovered {
                println!("recovered invalid state files to a clean baseline");
            }
        }
        Command::AddTask {
            title,
            owner,
            status,
            depends_on,
        } => {
            let task = add_task(
                &ctx,
                AddTaskArgs {
                    title,
                    owner,
                    status,
                    depends_on,
                },
            )?;
            println!("{}: {} [{}] owner={}", task.id, task.title, task.status, task.owner);
        }
        Command::Claim { task_id, member } => {
            let outcome = claim(&ctx, &task_id, &member)?;
            println!(
                "{} claimed by {} (was {} / {})",
                outcome.task.id, outcome.task.owner, outcome.previous_owner, outcome.previous_status
            );
        }
        Command::UpdateTask {
            task_id,
            status,
            owner,
            note,
            depends_on,
        } => {
            let task = update_task(
                &ctx,
                UpdateTaskArgs {
                    task_id,
                    status,
                    owner,
                    note,
                    depends_on,
                },
            )?;
            println!("{}: {} [{}] owner={}", task.id, task.title, task.status, task.owner);
        }
        Command::ListTasks => {
            let board = list_tasks(&store)?;
            if board.tasks.is_empty() {
                println!("no tasks");
            }
            for task in board.iter() {
                println!("{}: {} [{}] owner={}", task.id, task.title, task.status, task.owner);
                for dep in &task.depends_on {
                    println!("  depends on {dep}");
                }
                if let Some(note) = task.notes.last() {
                    println!("  note: {}", note.text);
                }
            }
        }
        Command::Message { from, to, body } => {
            send_message(&ctx, &from, &to, &body)?;
            println!("sent {from} -> {to}");
        }
        Command::Broadcast { from, body } => {
            broadcast(&ctx, &from, &body)?;
            println!("broadcast from {from}");
        }
        Command::Inbox { member } => {
            let messages = inbox(&store, &member)?;
            if messages.is_empty() {
                println!("inbox empty");
            }
            for message in messages {
                println!("[{}] {} -> {}: {}", message.at, message.from, message.to, message.body);
            }
        }
        Command::StartDebate {
            topic,
            options,
            members,
            decider,
            task_id,
        } => {
            let debate = start_debate(
                &ctx,
                StartDebateArgs {
                    topic,
                    options,
                    members,
                    decider,
                    task_id,
                },
            )?;
            println!(
                "{}: '{}' [{}] decider={} options={}",
                debate.id,
                debate.topic,
                debate.status,
                debate.decider,
                debate.options.join(", ")
            );
        }
        Command::AddPosition {
            debate_id,
            member,
            option,
            confidence,
            rationale,
        } => {
            let debate = add_position(&ctx, &debate_id, &member, &option, confidence, &rationale)?;
            println!(
                "{}: {} backs '{}' at {:.2} ({}/{} positions in)",
                debate.id,
                member,
                option,
                confidence,
                debate.positions.len(),
                debate.members.len()
            );
        }
        Command::DecideDebate {
            debate_id,
            option,
            rationale,
            require_all_positions,
            apply,
            status_on_apply,
            owner_map,
        } => {
            let debate = decide_debate(
                &ctx,
                DecideArgs {
                    debate_id,
                    option,
                    rationale,
                    require_all_positions,
                    apply,
                    status_on_apply,
                    owner_map,
                },
            )?;
            print_debate_summary(&debate);
        }
        Command::ShowDebate { debate_id } => {
            let debate = show_debate(&store, &debate_id)?;
            println!("{}", serde_json::to_string_pretty(&debate)?);
        }
        Command::ListDebates => {
            let debates = list_debates(&store)?;
            if debates.is_empty() {
                println!("no debates");
            }
            for debate in debates {
                println!(
                    "{}: '{}' [{}] {}/{} positions",
                    debate.id,
                    debate.topic,
                    debate.status,
                    debate.positions.len(),
                    debate.members.len()
                );
            }
        }
        Command::OrchestrateDebate {
            debate_id,
            topic,
            options,
            members,
            decider,
            task_id,
            no_reminders,
            status_on_apply,
            owner_map,
        } => {
            let outcome = orchestrate(
                &ctx,
                OrchestrateArgs {
                    debate_id,
                    topic,
                    options,
                    members,
                    decider,
                    task_id,
                    send_reminders: !no_reminders,
                    status_on_apply,
                    owner_map,
                },
            )?;
            if outcome.already_applied {
                println!("{}: already applied; nothing to do", outcome.debate.id);
            } else if outcome.decided {
                print_debate_summary(&outcome.debate);
            } else {
                println!(
                    "{}: waiting on positions from {}",
                    outcome.debate.id,
                    outcome.reminded.join(", ")
                );
            }
        }
        Command::MonitorReport => {
            let report = build_report(&monitor_path, &cli.team)?;
            print!("{report}");
        }
    }
    Ok(())
}

fn print_debate_summary(debate: &Debate) {
    match &debate.decision {
        Some(decision) => println!(
            "{}: [{}] '{}' -> {} ({})",
            debate.id, debate.status, debate.topic, decision.option, decision.rationale
        ),
        None => println!("{}: [{}] '{}'", debate.id, debate.status, debate.topic),
    }
}
