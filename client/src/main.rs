//! Command-line client for cartcast.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cartcast_client::ShoppingListClient;

#[derive(Parser)]
#[command(name = "cartcast-client", about = "Edit and sync shopping lists against a cartcast cluster")]
struct Cli {
    /// Any worker in the cluster.
    #[arg(long, default_value = "127.0.0.1:7000")]
    server: String,

    /// Profile name; each profile has its own local list store.
    #[arg(long, default_value = "default")]
    user: String,

    /// Override the local store location.
    #[arg(long)]
    data_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new empty list and print its id.
    Create,
    /// Add an item to a list.
    Add {
        list_id: String,
        item: String,
        quantity: i64,
    },
    /// Mark a quantity of an item as acquired.
    Remove {
        list_id: String,
        item: String,
        quantity: i64,
    },
    /// Show a list.
    Get { list_id: String },
    /// Show all locally known list ids.
    Lists,
    /// Push a list to the cluster and pull back the canonical state.
    Sync { list_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let data_path = cli
        .data_path
        .unwrap_or_else(|| PathBuf::from(format!("database/{}/shopping_lists.json", cli.user)));
    let client = ShoppingListClient::open(&cli.server, data_path).await?;

    match cli.command {
        Command::Create => {
            let list_id = client.create_list().await?;
            println!("{}", list_id);
        }
        Command::Add {
            list_id,
            item,
            quantity,
        } => {
            client.add_item(&list_id, &item, quantity).await?;
            println!("Added {} x{} to {}", item, quantity, list_id);
        }
        Command::Remove {
            list_id,
            item,
            quantity,
        } => {
            client.remove_item(&list_id, &item, quantity).await?;
            println!("Removed {} x{} from {}", item, quantity, list_id);
        }
        Command::Get { list_id } => {
            let list = client.get_list(&list_id).await?;
            print_list(&list_id, &list.view());
        }
        Command::Lists => {
            for list_id in client.lists().await? {
                println!("{}", list_id);
            }
        }
        Command::Sync { list_id } => {
            let list = client.sync_list(&list_id).await?;
            println!("List {} synced", list_id);
            print_list(&list_id, &list.view());
        }
    }
    Ok(())
}

fn print_list(list_id: &str, view: &std::collections::BTreeMap<String, i64>) {
    if view.is_empty() {
        println!("List {} is empty", list_id);
        return;
    }
    println!("Items in list {}:", list_id);
    for (name, quantity) in view {
        println!("  {}: {}", name, quantity);
    }
}
