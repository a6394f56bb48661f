use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dadfw::convert::DirectivePolicy;
use dadfw::lifecycle::missing_prerequisites;
use dadfw::remote::{FabricClient, RemoteClient};
use dadfw::workflow::{CompileOptions, Project, UploadOptions};
use dadfw::{AgentRecord, Config, WorkspaceRecord};

#[derive(Parser)]
#[command(name = "dad")]
#[command(about = "Build, deploy and test Fabric data agents from local notebooks", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, default_value = ".", help = "Project directory")]
    project_dir: PathBuf,

    #[arg(long, global = true, help = "State file (default: dad_state.json in the project)")]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new agent notebook and start tracking it
    Init {
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// List tracked agents
    List,
    /// Show an agent's record and what it is missing
    Status { name: Option<String> },
    /// Convert notebooks to Fabric source
    Compile {
        name: Option<String>,
        #[arg(long)]
        all_agents: bool,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        output_name: Option<String>,
        #[arg(long, help = "strict, permissive or inline")]
        policy: Option<DirectivePolicy>,
    },
    /// Upload compiled notebooks to a workspace
    Upload {
        name: Option<String>,
        #[arg(long)]
        all_agents: bool,
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        notebook_name: Option<String>,
        #[arg(long, help = "Replace an existing remote notebook")]
        update: bool,
    },
    /// Run an uploaded notebook and wait for it to finish
    Run {
        name: Option<String>,
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Record the published endpoint of an agent
    Publish {
        name: String,
        #[arg(long)]
        url: String,
    },
    /// Ask a published agent questions
    Test {
        name: String,
        #[arg(long = "question")]
        questions: Vec<String>,
    },
    /// Stop tracking an agent
    Remove {
        name: String,
        #[arg(long)]
        delete_files: bool,
    },
    /// Manage workspaces
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Direct remote calls, outside tracked state
    #[command(subcommand)]
    Debug(DebugCommand),
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    Add {
        name: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        storage_id: Option<String>,
        #[arg(long)]
        storage_name: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    Use { name: String },
    List,
}

#[derive(Subcommand)]
enum DebugCommand {
    ListNotebooks {
        #[arg(long)]
        workspace: Option<String>,
    },
    RunNotebook {
        notebook: String,
        #[arg(long)]
        workspace: Option<String>,
    },
    ListAgents {
        #[arg(long)]
        workspace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dadfw=info,dad=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.project_dir)
        .with_context(|| format!("loading configuration from {}", cli.project_dir.display()))?;
    if let Some(state_file) = cli.state_file {
        config.state_file = state_file;
    }
    let mut project = Project::open(&cli.project_dir, config)?;

    match cli.command {
        Commands::Init { name, force } => {
            let record = project.init_agent(&name, force)?;
            println!("Created agent '{}' in {}/", record.name, record.folder);
            println!("Next: edit {} then run `dad compile {}`", record.notebook_path.display(), name);
        }
        Commands::List => list_agents(&project),
        Commands::Status { name } => {
            let name = pick_agent(&project, name)?;
            print_status(&project, project.tracker.get(&name)?);
        }
        Commands::Compile {
            name,
            all_agents,
            output_dir,
            output_name,
            policy,
        } => {
            let options = CompileOptions {
                output_dir,
                output_name,
                policy,
            };
            if all_agents {
                let outcomes = project.compile_all(&options);
                let mut failed = 0;
                for outcome in &outcomes {
                    match &outcome.result {
                        Ok(path) => println!("  ok    {} -> {}", outcome.agent, path.display()),
                        Err(e) => {
                            failed += 1;
                            println!("  fail  {}: {}", outcome.agent, e);
                        }
                    }
                }
                if failed > 0 {
                    bail!("{} of {} agents failed to compile", failed, outcomes.len());
                }
            } else {
                let name = pick_agent(&project, name)?;
                let (record, artifact) = project.compile_agent(&name, &options)?;
                println!(
                    "Compiled '{}' ({} cells) -> {}",
                    name,
                    artifact.boundaries.len(),
                    record.artifact_path.unwrap_or_default().display()
                );
                for directive in &artifact.elided {
                    println!("  removed directive (cell {}): {}", directive.cell, directive.text);
                }
                if artifact.needs_inline_install() {
                    println!("  packages will be installed inline when the notebook runs");
                }
            }
        }
        Commands::Upload {
            name,
            all_agents,
            workspace,
            notebook_name,
            update,
        } => {
            let client = fabric_client(&project.config);
            let names = if all_agents {
                project.tracker.list().iter().map(|r| r.name.clone()).collect()
            } else {
                vec![pick_agent(&project, name)?]
            };
            let options = UploadOptions {
                workspace,
                display_name: if all_agents { None } else { notebook_name },
                update,
            };

            for name in names {
                let outcome = project.upload_agent(&client, &name, &options).await?;
                println!(
                    "{} notebook '{}' ({}) for '{}'",
                    if outcome.created { "Created" } else { "Updated" },
                    outcome.notebook.display_name,
                    outcome.notebook.id,
                    name
                );
            }
        }
        Commands::Run { name, workspace } => {
            let client = fabric_client(&project.config);
            let name = pick_agent(&project, name)?;
            let outcome = project.run_agent(&client, &name, workspace.as_deref()).await?;
            println!(
                "Job {} {} after {}s",
                outcome.job.job_id,
                outcome.job.state,
                outcome.job.waited.as_secs()
            );
            match (&outcome.agent, &outcome.suggested_endpoint) {
                (Some(agent), Some(endpoint)) => {
                    println!("Data agent: {} ({})", agent.display_name, agent.id);
                    println!("Publish with: dad publish {} --url {}", name, endpoint);
                }
                _ => println!("No data agent named '{}' was found in the workspace", name),
            }
        }
        Commands::Publish { name, url } => {
            let record = project.publish_agent(&name, &url)?;
            println!("'{}' is {} at {}", name, record.stage, url);
        }
        Commands::Test { name, questions } => {
            let client = fabric_client(&project.config);
            let report = project.test_agent(&client, &name, &questions).await?;
            for answer in &report.answers {
                println!("Q: {}", answer.question);
                match &answer.answer {
                    Ok(text) => println!("A: {}\n", text),
                    Err(e) => println!("error: {}\n", e),
                }
            }
            if !report.passed() {
                bail!("{} question(s) failed", report.failures().count());
            }
            println!("'{}' is {}", name, report.record.stage);
        }
        Commands::Remove { name, delete_files } => {
            project.remove_agent(&name, delete_files)?;
            println!("Removed '{}'", name);
        }
        Commands::Workspace(command) => workspace_command(&mut project, command)?,
        Commands::Debug(command) => debug_command(&project, command).await?,
    }

    Ok(())
}

fn fabric_client(config: &Config) -> FabricClient {
    FabricClient::new(config.credential()).with_base_url(config.api_base.clone())
}

/// An explicit name, or the only tracked agent.
fn pick_agent(project: &Project, name: Option<String>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    match project.tracker.list().as_slice() {
        [only] => Ok(only.name.clone()),
        [] => bail!("no agents tracked; run `dad init <name>` first"),
        _ => bail!("several agents are tracked; name one"),
    }
}

fn list_agents(project: &Project) {
    let agents = project.tracker.list();
    if agents.is_empty() {
        println!("No agents tracked");
        return;
    }
    println!("{:<24} {:<10} {}", "NAME", "STAGE", "UPDATED");
    for record in agents {
        println!(
            "{:<24} {:<10} {}",
            record.name,
            record.stage,
            record.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_status(project: &Project, record: &AgentRecord) {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    println!("Agent:     {}", record.name);
    println!("Stage:     {}", record.stage);
    println!("Notebook:  {}", record.notebook_path.display());
    println!(
        "Artifact:  {}",
        record
            .artifact_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Workspace: {}", show(&record.workspace_id));
    println!("Notebook:  {}", show(&record.remote_notebook_id));
    println!("Agent id:  {}", show(&record.remote_agent_id));
    println!("Endpoint:  {}", show(&record.endpoint_url));
    if let Some(job) = &record.last_job {
        println!("Last job:  {} {} ({}s)", job.job_id, job.status, job.runtime_secs);
    }

    let missing = missing_prerequisites(record, &project.root);
    if !missing.is_empty() {
        println!("Missing:");
        for item in missing {
            println!("  - {}", item);
        }
    }
}

fn workspace_command(project: &mut Project, command: WorkspaceCommand) -> Result<()> {
    match command {
        WorkspaceCommand::Add {
            name,
            id,
            tenant,
            storage_id,
            storage_name,
            description,
        } => {
            let tenant = tenant
                .or_else(|| project.config.tenant_id.clone())
                .unwrap_or_default();
            let mut record = WorkspaceRecord::new(id, tenant)?;
            record.description = description;
            if let (Some(storage_id), Some(storage_name)) = (storage_id, storage_name) {
                record = record.with_storage(storage_id, storage_name);
            }
            project.tracker.register_workspace(&name, record)?;
            println!("Registered workspace '{}'", name);
        }
        WorkspaceCommand::Use { name } => {
            project.tracker.set_active_workspace(&name)?;
            println!("Active workspace: {}", name);
        }
        WorkspaceCommand::List => {
            let active = project.tracker.active_workspace().map(|(name, _)| name.to_string());
            for (name, record) in project.tracker.workspaces() {
                let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!(
                    "{} {:<16} {} {}",
                    marker,
                    name,
                    record.id,
                    record.storage_name.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

async fn debug_command(project: &Project, command: DebugCommand) -> Result<()> {
    let client = fabric_client(&project.config);

    match command {
        DebugCommand::ListNotebooks { workspace } => {
            let workspace = project.resolve_workspace(workspace.as_deref())?;
            for notebook in client.list_notebooks(&workspace.record.id).await? {
                println!("{}  {}", notebook.id, notebook.display_name);
            }
        }
        DebugCommand::RunNotebook { notebook, workspace } => {
            let outcome = project
                .run_notebook(&client, workspace.as_deref(), &notebook)
                .await?;
            println!(
                "Job {} {} after {}s",
                outcome.job_id,
                outcome.state,
                outcome.waited.as_secs()
            );
        }
        DebugCommand::ListAgents { workspace } => {
            let workspace = project.resolve_workspace(workspace.as_deref())?;
            for agent in client.list_data_agents(&workspace.record.id).await? {
                println!("{}  {}", agent.id, agent.display_name);
            }
        }
    }
    Ok(())
}
