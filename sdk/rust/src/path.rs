/// Builds `/proxy/...` chains.
///
/// Each [`hop`](HopPath::hop) adds one forwarding step; the final path is
/// what the last hop handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopPath {
    hops: Vec<String>,
    tail: String,
}

impl HopPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward through `authority` (`host` or `host:port`).
    pub fn hop(mut self, authority: impl Into<String>) -> Self {
        self.hops.push(authority.into().trim_matches('/').to_string());
        self
    }

    /// Path handled by the last hop, e.g. `/errors/50`.
    pub fn then(mut self, path: impl Into<String>) -> Self {
        self.tail = path.into();
        self
    }

    pub fn build(&self) -> String {
        let mut path = String::new();
        for hop in &self.hops {
            path.push_str("/proxy/");
            path.push_str(hop);
        }
        if !self.tail.starts_with('/') {
            path.push('/');
        }
        path.push_str(&self.tail);
        path
    }
}
