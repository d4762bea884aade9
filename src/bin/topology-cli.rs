use clap::{Parser, Subcommand};
use topology_client::{Envelope, HopPath, TopologyClient};

#[derive(Parser)]
#[command(name = "topology-cli")]
#[command(about = "Drive topology-tester nodes from the command line", long_about = None)]
struct Cli {
    /// Node to talk to.
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the error percentage
    Errors { percentage: u8 },
    /// Set the duplicate header percentage
    Headers { percentage: u8 },
    /// Set the injected latency (e.g. 250ms, 1s, or bare milliseconds)
    Latency { duration: String },
    /// Turn next-hop failures into successful responses, or stop doing so
    Graceful {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Run local work units: serial, mixed or parallel
    Local { mode: String, duration: String },
    /// Send a request through a chain of nodes
    Hop {
        /// Next hops in order, as host or host:port
        #[arg(required = true)]
        hops: Vec<String>,
        /// Path handled by the last hop
        #[arg(long, default_value = "/")]
        then: String,
    },
    /// Ask the node to terminate after its crash delay
    Crash { message: String },
    /// Echo a path on the node
    Echo {
        #[arg(default_value = "/")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = TopologyClient::new(&cli.url)?;

    let envelope = match cli.command {
        Commands::Errors { percentage } => client.set_errors(percentage).await?,
        Commands::Headers { percentage } => client.set_headers(percentage).await?,
        Commands::Latency { duration } => client.set_latency(&duration).await?,
        Commands::Graceful { enabled } => client.set_graceful(enabled).await?,
        Commands::Local { mode, duration } => client.local(&mode, &duration).await?,
        Commands::Hop { hops, then } => {
            let path = hops.into_iter().fold(HopPath::new(), HopPath::hop).then(then);
            client.get(&path.build()).await?
        }
        Commands::Crash { message } => client.crash(&message).await?,
        Commands::Echo { path } => client.get(&path).await?,
    };

    print_envelope(&envelope)?;
    if envelope.status_code >= 400 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_envelope(envelope: &Envelope) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}
