//! Client for topology-tester nodes.
//!
//! ```no_run
//! # async fn demo() -> Result<(), topology_client::ClientError> {
//! use topology_client::{HopPath, TopologyClient};
//!
//! let client = TopologyClient::new("http://svc-a:8000")?;
//! client.set_errors(20).await?;
//! let path = HopPath::new().hop("svc-b:8000").hop("svc-c:8000").then("/latency/50ms");
//! let envelope = client.get(&path.build()).await?;
//! println!("{}", envelope.service);
//! # Ok(())
//! # }
//! ```

mod client;
mod path;

pub use client::{ClientError, Envelope, TopologyClient};
pub use path::HopPath;
