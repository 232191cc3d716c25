mod catalog;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use derivative::Derivative;

use warehouse_model::ViewId;
use warehouse_runtime::{InMemorySchemaService, LocalActionRunner};
use warehouse_scheduler::{SchedulerConfig, UserIdentity, ViewManager};

/// warehouse-daemon loads a view catalog and drives one-shot scheduling
/// commands against it. Each invocation builds a fresh `ViewManager`; the
/// coordinators it spawns live only for the process's lifetime, with no
/// scheduler state persisted across restarts.
#[derive(Derivative, Parser)]
#[derivative(Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON array of view descriptors.
    #[clap(long = "catalog", env = "WAREHOUSE_CATALOG")]
    catalog: PathBuf,
    /// Root directory under which the reference `ActionRunner` resolves
    /// view paths (success markers, filesystem transformations).
    #[clap(long = "data-root", env = "WAREHOUSE_DATA_ROOT", default_value = "./warehouse-data")]
    data_root: PathBuf,
    /// Retries attempted, beyond the first, before giving up on a view.
    #[clap(long = "max-retries", env = "WAREHOUSE_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,
    /// Timeout applied to a `ViewManager` dependency lookup.
    #[clap(long = "dependency-timeout", env = "WAREHOUSE_DEPENDENCY_TIMEOUT", default_value = "5s")]
    dependency_timeout: humantime::Duration,
    /// Timeout applied to filesystem actions (touch/delete/marker checks).
    #[clap(long = "file-action-timeout", env = "WAREHOUSE_FILE_ACTION_TIMEOUT", default_value = "30s")]
    file_action_timeout: humantime::Duration,
    /// Timeout applied to schema-service calls.
    #[clap(long = "schema-action-timeout", env = "WAREHOUSE_SCHEMA_ACTION_TIMEOUT", default_value = "10s")]
    schema_action_timeout: humantime::Duration,
    /// Identity under which filesystem and action calls run.
    #[clap(
        long = "user-identity",
        env = "WAREHOUSE_USER_IDENTITY",
        default_value = "warehouse-scheduler"
    )]
    user_identity: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// Materialize a view, blocking until it answers.
    Materialize { view: ViewId },
    /// Reset a view to Initial, so its next Materialize recomputes from scratch.
    Invalidate { view: ViewId },
    /// Print a view's current coordinator state.
    Status { view: ViewId },
}

fn main() -> Result<(), anyhow::Error> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();
    tracing::info!(?args, "warehouse-daemon starting");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let views = catalog::load(&args.catalog)?;

    let config = SchedulerConfig {
        max_retries: args.max_retries,
        dependency_timeout: args.dependency_timeout.into(),
        file_action_timeout: args.file_action_timeout.into(),
        schema_action_timeout: args.schema_action_timeout.into(),
        user_identity: UserIdentity(args.user_identity),
    };

    let action_runner = Arc::new(LocalActionRunner::new(args.data_root));
    let schema_service = Arc::new(InMemorySchemaService::new());
    let manager = ViewManager::new(action_runner, schema_service, config);

    for view in views {
        manager.register_view(view).await;
    }

    match args.command {
        Command::Materialize { view } => {
            let reply = manager.materialize(view).await?;
            println!("{reply:?}");
        }
        Command::Invalidate { view } => {
            manager.invalidate(view).await?;
            println!("invalidated {view}");
        }
        Command::Status { view } => {
            let status = manager.status(view).await?;
            println!("{} is {}", status.view, status.state);
        }
    }

    Ok(())
}
