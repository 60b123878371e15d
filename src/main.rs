use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use flowsync::config::Config;
use flowsync::resources::{Note, NoteDraft, Task, TaskDraft, TaskStatus, User};
use flowsync::workflow::TaskAction;
use flowsync::{HttpResourceClient, ListKey, Mirror};

#[derive(Parser, Debug)]
#[command(name = "flowsync")]
#[command(about = "Mirror flows and tasks from a server and drive the approval workflow")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/flowsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all flows
  Flows,
  /// Show one flow with its ongoing and approved tasks
  Flow { id: String },
  /// List tasks, optionally scoped to a flow
  Tasks {
    #[arg(long)]
    flow: Option<String>,
  },
  /// Create a task under a flow
  CreateTask {
    #[arg(long)]
    flow: String,
    name: String,
    #[arg(long, default_value = "")]
    description: String,
  },
  /// Check a task off and send it for approval
  Complete { id: String },
  /// Uncheck a task that is awaiting approval
  Uncheck { id: String },
  /// Approve a completed task (requires the admin role)
  Approve { id: String },
  /// Reject a completed task back to open (requires the admin role)
  Reject { id: String },
  /// List a task's notes with author names
  Notes { task: String },
  /// Comment on a task as the configured user
  AddNote { task: String, content: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let remote = HttpResourceClient::new(&config)?;
  let mirror = Mirror::new(remote);

  match args.command {
    Command::Flows => list_flows(&mirror).await,
    Command::Flow { id } => show_flow(&mirror, &id).await,
    Command::Tasks { flow } => list_tasks(&mirror, flow.as_deref()).await,
    Command::CreateTask {
      flow,
      name,
      description,
    } => create_task(&mirror, &flow, &name, &description).await,
    Command::Complete { id } => run_task_action(&mirror, &config, &id, TaskAction::MarkComplete).await,
    Command::Uncheck { id } => run_task_action(&mirror, &config, &id, TaskAction::UnmarkComplete).await,
    Command::Approve { id } => run_task_action(&mirror, &config, &id, TaskAction::Approve).await,
    Command::Reject { id } => run_task_action(&mirror, &config, &id, TaskAction::Reject).await,
    Command::Notes { task } => show_notes(&mirror, &task).await,
    Command::AddNote { task, content } => add_note(&mirror, &config, &task, &content).await,
  }
}

async fn list_flows(mirror: &Mirror<HttpResourceClient>) -> Result<()> {
  mirror.flows.ensure_list(&ListKey::all()).await?;
  for flow in mirror.flows.get_list(&ListKey::all())? {
    println!("{}  {}", flow.id, flow.name);
  }
  Ok(())
}

async fn show_flow(mirror: &Mirror<HttpResourceClient>, id: &str) -> Result<()> {
  let key = ListKey::filtered(Task::BY_FLOW, id);
  mirror.flows.ensure_single(id).await?;
  mirror.tasks.ensure_list(&key).await?;

  let flow = mirror
    .flows
    .get_record(id)?
    .ok_or_else(|| eyre!("flow {} not found", id))?;
  println!("{}", flow.name);
  if !flow.description.is_empty() {
    println!("{}", flow.description);
  }

  let tasks = mirror.tasks.get_list(&key)?;
  println!("\nOngoing tasks:");
  for task in tasks.iter().filter(|t| t.status != TaskStatus::Approved) {
    print_task(task);
  }
  println!("\nApproved tasks:");
  for task in tasks.iter().filter(|t| t.status == TaskStatus::Approved) {
    print_task(task);
  }
  Ok(())
}

async fn list_tasks(mirror: &Mirror<HttpResourceClient>, flow: Option<&str>) -> Result<()> {
  let key = match flow {
    Some(flow_id) => ListKey::filtered(Task::BY_FLOW, flow_id),
    None => ListKey::all(),
  };
  mirror.tasks.ensure_list(&key).await?;
  for task in mirror.tasks.get_list(&key)? {
    print_task(&task);
  }
  Ok(())
}

async fn create_task(
  mirror: &Mirror<HttpResourceClient>,
  flow_id: &str,
  name: &str,
  description: &str,
) -> Result<()> {
  let mut draft = TaskDraft::new(flow_id, name);
  draft.description = description.to_string();

  let created = mirror.tasks.create(&draft).await?;

  // Membership of the flow's task list changed; this caller knows which
  // key that is.
  let key = ListKey::filtered(Task::BY_FLOW, flow_id);
  mirror.tasks.invalidate_list(&key)?;
  mirror.tasks.ensure_list(&key).await?;

  println!("Created task {} under flow {}", created.id, flow_id);
  Ok(())
}

async fn run_task_action(
  mirror: &Mirror<HttpResourceClient>,
  config: &Config,
  id: &str,
  action: TaskAction,
) -> Result<()> {
  mirror.tasks.ensure_single(id).await?;
  let task = mirror
    .tasks
    .get_record(id)?
    .ok_or_else(|| eyre!("task {} not found", id))?;

  let actor = acting_user(mirror, config).await?;
  let saved = mirror
    .tasks
    .apply_task_action(&task, action, &actor.roles)
    .await?;

  match saved.status {
    TaskStatus::AwaitingApproval => println!("Task marked as completed. Waiting for approval."),
    TaskStatus::Approved => println!("Task completion approved."),
    TaskStatus::Open if action == TaskAction::Reject => println!("Task completion rejected."),
    TaskStatus::Open => println!("Task has been unmarked."),
  }
  Ok(())
}

async fn show_notes(mirror: &Mirror<HttpResourceClient>, task_id: &str) -> Result<()> {
  let key = ListKey::filtered(Note::BY_TASK, task_id);
  mirror.notes.ensure_list(&key).await?;
  mirror.users.ensure_list(&ListKey::all()).await?;

  let users = mirror.users.get_list(&ListKey::all())?;
  for note in mirror.notes.get_list(&key)? {
    let author = users
      .iter()
      .find(|u| u.id == note.user_id)
      .map(User::display_name)
      .unwrap_or_else(|| note.user_id.clone());
    let when = note
      .created
      .map(|d| d.format(" @ %Y-%m-%d %H:%M").to_string())
      .unwrap_or_default();
    println!("{author}{when}");
    println!("  {}", note.content);
  }
  Ok(())
}

async fn add_note(
  mirror: &Mirror<HttpResourceClient>,
  config: &Config,
  task_id: &str,
  content: &str,
) -> Result<()> {
  let actor = acting_user(mirror, config).await?;
  let draft = NoteDraft {
    task_id: task_id.to_string(),
    user_id: actor.id,
    content: content.to_string(),
  };
  mirror.notes.create(&draft).await?;

  let key = ListKey::filtered(Note::BY_TASK, task_id);
  mirror.notes.invalidate_list(&key)?;
  mirror.notes.ensure_list(&key).await?;

  println!("Comment added.");
  Ok(())
}

/// The configured user drives workflow actions and signs notes.
async fn acting_user(mirror: &Mirror<HttpResourceClient>, config: &Config) -> Result<User> {
  let user_id = config
    .user_id
    .as_deref()
    .ok_or_else(|| eyre!("Set user_id in the config to run this command"))?;
  mirror.users.ensure_single(user_id).await?;
  mirror
    .users
    .get_record(user_id)?
    .ok_or_else(|| eyre!("user {} not found", user_id))
}

fn print_task(task: &Task) {
  let mark = if task.complete { "[x]" } else { "[ ]" };
  println!("  {} {}  {} ({})", mark, task.id, task.name, task.status);
}
