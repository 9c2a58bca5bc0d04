use std::fmt;

/// One addressable cache endpoint.
///
/// Addresses are the `host:port` strings reported by the cluster
/// configuration endpoint. An address containing a `/` is a unix-domain
/// socket path. Two nodes are equal when their canonical address strings
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    addr: String,
}

impl Node {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Network family of this endpoint: `"tcp"`, or `"unix"` for socket paths.
    pub fn network(&self) -> &'static str {
        if self.addr.contains('/') {
            "unix"
        } else {
            "tcp"
        }
    }

    /// Canonical address form.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}
