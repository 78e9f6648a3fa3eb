use anyhow::Context;
use clap::{Parser, Subcommand};
use kanban_board_api::api::{self, AppState};
use kanban_board_api::client::{self, ClientError};
use kanban_board_api::config::Config;
use kanban_board_api::store::PgStore;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// The address to bind to (defaults to KANBAN_BIND or 127.0.0.1:37240)
        #[arg(short, long)]
        addr: Option<SocketAddr>,
        /// Keep boards in memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },
    /// Client commands
    Client {
        /// The base URL of the API
        #[arg(long, default_value = kanban_board_api::BASE_URL)]
        url: String,
        /// The user to act as, sent in the X-User-Id header
        #[arg(long, env = "KANBAN_USER_ID")]
        user: Uuid,
        #[command(subcommand)]
        command: ClientCommands,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Project related commands
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Print the board of a project
    Board {
        /// The project ID
        project_id: Uuid,
    },
    /// Print the activity log of a project, newest first
    Activities {
        /// The project ID
        project_id: Uuid,
    },
    /// Column related commands
    Columns {
        #[command(subcommand)]
        command: ColumnCommands,
    },
    /// Task related commands
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List projects the user belongs to
    List,
    /// Create a new project with the default columns
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Additional member IDs
        #[arg(long = "member")]
        members: Vec<Uuid>,
    },
    /// Delete a project (owner only)
    Delete { project_id: Uuid },
}

#[derive(Subcommand)]
enum ColumnCommands {
    /// Add a column at the end of the board
    Create {
        project_id: Uuid,
        #[arg(long)]
        title: String,
    },
    /// Delete a column, moving its tasks to the neighbouring column
    Delete { column_id: Uuid },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task at the end of a column
    Create {
        column_id: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Move a task to a column and position
    Move {
        task_id: Uuid,
        /// The destination column ID
        #[arg(long)]
        column: Uuid,
        /// Zero-based position; appends when omitted
        #[arg(long)]
        position: Option<usize>,
    },
    /// Delete a task
    Delete { task_id: Uuid },
    /// Comment on a task
    Comment {
        task_id: Uuid,
        #[arg(long)]
        content: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr, memory } => serve(addr, memory).await,
        Commands::Client { url, user, command } => {
            if let Err(e) = run_client(&url, user, command).await {
                match e {
                    ClientError::NotFound(id) => eprintln!("Error: {} not found", id),
                    e => eprintln!("Error: {}", e),
                }
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(addr: Option<SocketAddr>, memory: bool) -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    let addr = addr.unwrap_or(config.bind);

    let state = if memory {
        info!("using in-memory store");
        AppState::in_memory(config)
    } else {
        let database_url = config
            .database_url
            .clone()
            .context("DATABASE_URL must be set in .env file (or pass --memory)")?;
        let store = PgStore::connect(&database_url, config.pool_size)
            .context("Failed to create pool")?;
        AppState::new(Arc::new(store), config)
    };

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ClientError> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => return Err(ClientError::ServerError(e.to_string())),
    }
    Ok(())
}

async fn run_client(url: &str, user: Uuid, command: ClientCommands) -> Result<(), ClientError> {
    match command {
        ClientCommands::Projects { command } => match command {
            ProjectCommands::List => print_json(&client::fetch_projects(url, user).await?),
            ProjectCommands::Create {
                name,
                description,
                members,
            } => {
                let request = client::CreateProjectRequest {
                    name,
                    description,
                    deadline: None,
                    members,
                };
                print_json(&client::create_project(url, user, &request).await?)
            }
            ProjectCommands::Delete { project_id } => {
                client::delete_project(url, user, project_id).await?;
                println!("Project {} deleted successfully", project_id);
                Ok(())
            }
        },
        ClientCommands::Board { project_id } => {
            let board = client::fetch_board(url, user, project_id).await?;
            println!("{}", board.project.name);
            for column in &board.columns {
                println!("\n[{}] {} ({})", column.id, column.title, column.tasks.len());
                for task in &column.tasks {
                    println!("  - [{}] {}", task.id, task.title);
                }
            }
            Ok(())
        }
        ClientCommands::Activities { project_id } => {
            for activity in client::fetch_activities(url, user, project_id).await? {
                println!(
                    "{} {} {} {}",
                    activity.created_at,
                    activity.user_id,
                    activity.action.as_str(),
                    activity.details
                );
            }
            Ok(())
        }
        ClientCommands::Columns { command } => match command {
            ColumnCommands::Create { project_id, title } => {
                print_json(&client::create_column(url, user, project_id, &title).await?)
            }
            ColumnCommands::Delete { column_id } => {
                print_json(&client::delete_column(url, user, column_id).await?)
            }
        },
        ClientCommands::Tasks { command } => match command {
            TaskCommands::Create {
                column_id,
                title,
                description,
            } => {
                let request = client::CreateTaskRequest {
                    title,
                    description,
                    due_date: None,
                    assignees: vec![],
                    labels: vec![],
                };
                print_json(&client::create_task(url, user, column_id, &request).await?)
            }
            TaskCommands::Move {
                task_id,
                column,
                position,
            } => {
                let request = client::MoveTaskRequest {
                    target_column_id: column,
                    position,
                };
                print_json(&client::move_task(url, user, task_id, &request).await?)
            }
            TaskCommands::Delete { task_id } => {
                client::delete_task(url, user, task_id).await?;
                println!("Task {} deleted successfully", task_id);
                Ok(())
            }
            TaskCommands::Comment { task_id, content } => {
                print_json(&client::add_comment(url, user, task_id, &content).await?)
            }
        },
    }
}
