use anyhow::Context;
use clap::{Parser, Subcommand};
use space_dock_executor::common::EnvironmentDescriptor;
use space_dock_executor::{folder_uri, OrchestratorConfig, SpaceDock};
use space_dock_gateway::{config::ServerConfig, create_app, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,space_dock_executor=debug,space_dock_gateway=debug";

#[derive(Parser)]
#[command(name = "space-dock")]
#[command(author, version, about = "Disposable development environments from git repositories", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        #[command(flatten)]
        server: ServerConfig,
    },

    /// Clone, build and launch one environment, then print how to attach to it
    Provision {
        /// Repository to clone
        repository_url: String,

        #[arg(long, default_value = "node:current-alpine")]
        base_image: String,

        #[arg(long, default_value = "apk update")]
        update_command: String,

        /// Package keys, comma separated
        #[arg(long, value_delimiter = ',', default_value = "git,gnupg")]
        packages: Vec<String>,

        #[arg(long, default_value = "npm ci;npm build")]
        build_command: String,

        #[arg(long, default_value = "npm run dev")]
        start_command: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    let dock = SpaceDock::with_docker(OrchestratorConfig::from_env())
        .context("Failed to connect to the Docker daemon")?;

    match args.command {
        Command::Serve { server } => serve(server, dock).await,
        Command::Provision {
            repository_url,
            base_image,
            update_command,
            packages,
            build_command,
            start_command,
        } => {
            let descriptor = EnvironmentDescriptor::new(
                base_image,
                update_command,
                packages,
                build_command,
                start_command,
            )?;
            provision(&dock, &repository_url, &descriptor).await
        }
    }
}

async fn serve(config: ServerConfig, dock: SpaceDock) -> anyhow::Result<()> {
    let app = create_app(AppState::new(dock));
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("space-dock gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn provision(
    dock: &SpaceDock,
    repository_url: &str,
    descriptor: &EnvironmentDescriptor,
) -> anyhow::Result<()> {
    let created = dock.create_image(repository_url, descriptor).await?;
    println!("Image: {} ({})", created.image.short_id, created.image.tags.join(", "));
    if !created.ignored_packages.is_empty() {
        println!("Ignored packages: {}", created.ignored_packages.join(", "));
    }

    let container = dock.create_container(&created.image.short_id).await?;
    println!("Container: {} ({})", container.short_id, container.name);

    for line in dock.container_logs(&container.id).await? {
        println!("  {line}");
    }

    println!("Open in VS Code: {}", container.connection_uri);
    println!("  code --folder-uri {}", folder_uri(&container.short_id));
    Ok(())
}
