//! CLI for PopMesh
//!
//! Subcommands:
//! - `config`: print the resolved configuration
//! - `demo`: run two in-process nodes through a request round-trip and a
//!   publish/subscribe exchange (useful for smoke tests)

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use popmesh::config::{Settings, load_config};
use popmesh::{MemoryHub, Node, NodeOptions, after, handler, hook};
use tracing::{error, info};

const BROKER: &str = "inproc://broker";
const EVENTS: &str = "inproc://events";

#[derive(Parser)]
#[command(name = "popmesh")]
enum Command {
    /// Print the resolved configuration as JSON
    Config,
    /// Run the in-process demo
    Demo {
        /// Number of concurrent `foo` requests to send
        #[arg(long, default_value_t = 3)]
        requests: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cmd = Command::parse();
    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            popmesh::utils::logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    popmesh::utils::logging::init(&settings.logging.level);

    match cmd {
        Command::Config => match serde_json::to_string_pretty(&settings) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to render configuration: {}", e),
        },
        Command::Demo { requests } => {
            tokio::select! {
                result = run_demo(&settings, requests) => {
                    if let Err(e) = result {
                        error!("Demo failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received. Exiting gracefully.");
                }
            }
        }
    }
}

async fn run_demo(settings: &Settings, requests: i64) -> Result<(), Box<dyn std::error::Error>> {
    let hub = MemoryHub::new();
    let timeout_ms = settings.node.request_timeout_ms;

    let a = Node::connect(
        NodeOptions::new("node-a")
            .broker(BROKER)
            .request(timeout_ms)
            .subscribe([EVENTS]),
        &hub,
    )?;
    let b = Node::connect(
        NodeOptions::new("node-b")
            .broker(BROKER)
            .respond()
            .publish(EVENTS),
        &hub,
    )?;

    // Request/response: foo(x, y) sends x + y, node-b answers with d + 10.
    b.create_response("foo", hook(|d: i64| d + 10))?;
    let foo = a.create_request("foo", "node-b", Some(hook(|(x, y): (i64, i64)| x + y)))?;

    let calls = (0..requests).map(|i| {
        let foo = foo.clone();
        async move { (i, foo.call((5 + i, 7)).await) }
    });
    for (i, result) in join_all(calls).await {
        info!("foo({}, 7) = {}", 5 + i, result?);
    }

    // Publish/subscribe: node-b publishes products, node-a sums them.
    let total = Arc::new(AtomicI64::new(0));
    let sum = total.clone();
    let owner = a.next_owner_id()?;
    a.create_subscription(
        "product",
        owner,
        handler(move |value: i64| {
            sum.fetch_add(value, Ordering::SeqCst);
        }),
    )?;

    let product = b.create_publish(
        "product",
        Some(hook(|(x, y): (i64, i64)| x * y)),
        Some(after(|value: i64| info!("published product {}", value))),
    )?;
    for x in 1..=3 {
        product.publish((x, 5))?;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("node-a received a total of {}", total.load(Ordering::SeqCst));

    b.close();
    a.close();
    Ok(())
}
