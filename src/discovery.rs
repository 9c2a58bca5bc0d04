use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::{Error, Node};

/// Default poll interval. Cluster topology changes are rare and the
/// configuration endpoint should not be hammered.
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

const CONFIG_COMMAND: &[u8] = b"config get cluster\r\n";

/// Marks the payload line of a configuration response; ElastiCache node
/// hostnames live under `amazonaws.com`.
const PAYLOAD_MARKER: &str = "amazonaws";

/// Settings for the discovery poller.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub(crate) cluster_address: String,
    pub(crate) poll_interval: Duration,
    pub(crate) rebuild_on_departure: bool,
    pub(crate) io_timeout: Option<Duration>,
}

impl DiscoveryConfig {
    /// Configuration for the cluster endpoint at `cluster_address`
    /// (`host:port`).
    pub fn new(cluster_address: impl Into<String>) -> Self {
        Self {
            cluster_address: cluster_address.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            rebuild_on_departure: false,
            io_timeout: None,
        }
    }

    /// Override the poll interval. Default is 1 hour.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Also rebuild the ring when a known node disappears from the
    /// discovery response.
    ///
    /// Off by default: a node that has left keeps its ring point (and keeps
    /// receiving traffic) until the next arrival forces a rebuild, which
    /// keeps the key assignment stable across transient membership noise.
    pub fn rebuild_on_departure(mut self, enabled: bool) -> Self {
        self.rebuild_on_departure = enabled;
        self
    }

    /// Deadline for one whole discovery attempt (connect, write, read).
    ///
    /// None by default: a stalled endpoint then stalls that one poll cycle,
    /// never lookups.
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }
}

/// Run one discovery attempt against the configuration endpoint.
pub(crate) async fn fetch_nodes(config: &DiscoveryConfig) -> Result<Vec<Node>, Error> {
    match config.io_timeout {
        Some(deadline) => tokio::time::timeout(deadline, fetch(&config.cluster_address))
            .await
            .map_err(|_| {
                Error::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "discovery attempt deadline exceeded",
                ))
            })?,
        None => fetch(&config.cluster_address).await,
    }
}

async fn fetch(cluster_address: &str) -> Result<Vec<Node>, Error> {
    let mut stream = TcpStream::connect(cluster_address).await?;
    stream.write_all(CONFIG_COMMAND).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let nodes = parse_nodes(&mut reader).await?;
    if nodes.is_empty() {
        return Err(Error::NoNodesDiscovered);
    }
    Ok(nodes)
}

/// Read a configuration response and extract the advertised nodes.
///
/// Reads until the terminal `END` line or end-of-stream. A line containing
/// `ERROR` aborts the attempt; the line carrying the `amazonaws` marker is
/// the payload.
pub(crate) async fn parse_nodes<R>(reader: &mut R) -> Result<Vec<Node>, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut nodes = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(nodes);
        }

        let trimmed = line.trim_end();
        if trimmed == "END" {
            return Ok(nodes);
        }
        if trimmed.contains("ERROR") {
            return Err(Error::InvalidCommand);
        }
        if trimmed.contains(PAYLOAD_MARKER) {
            nodes = parse_payload(trimmed);
        }
    }
}

/// Payload line: space-separated `hostname|ip|port` records. The IP is
/// discarded; the hostname is the address of record. Records that do not
/// have exactly three fields are skipped, never failed. Config payloads can
/// carry literal `\n\r\n` escape artifacts at the end of the record list;
/// those are stripped before splitting.
fn parse_payload(line: &str) -> Vec<Node> {
    let line = line.replace("\\n\\r\\n", "");
    line.split(' ')
        .filter_map(|record| {
            let mut fields = record.split('|');
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(host), Some(_ip), Some(port), None)
                    if !host.is_empty() && !port.is_empty() =>
                {
                    Some(Node::new(format!("{}:{}", host, port)))
                }
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_documented_cluster_response() {
        // The response format documented for ElastiCache auto discovery,
        // escape artifacts included.
        let message = concat!(
            "CONFIG cluster 0 136\\r\\n\n",
            "12\\n\n",
            "myCluster.pc4ldq.0001.use1.cache.amazonaws.com|10.82.235.120|11211 ",
            "myCluster.pc4ldq.0002.use1.cache.amazonaws.com|10.80.249.27|11211\\n\\r\\n \n",
            "END\\r\\n",
        );

        let mut reader = message.as_bytes();
        let nodes = parse_nodes(&mut reader).await.unwrap();
        assert_eq!(
            nodes,
            [
                Node::new("myCluster.pc4ldq.0001.use1.cache.amazonaws.com:11211"),
                Node::new("myCluster.pc4ldq.0002.use1.cache.amazonaws.com:11211"),
            ]
        );
    }

    #[tokio::test]
    async fn stops_at_terminal_end_line() {
        let message = "CONFIG cluster 2 70\r\n\
                       node-1.use1.cache.amazonaws.com|10.82.235.120|11211\n\
                       \r\n\
                       END\r\n\
                       trailing garbage that must not be read\r\n";

        let mut reader = message.as_bytes();
        let nodes = parse_nodes(&mut reader).await.unwrap();
        assert_eq!(nodes, [Node::new("node-1.use1.cache.amazonaws.com:11211")]);
    }

    #[tokio::test]
    async fn error_line_aborts_the_attempt() {
        let message = "CONFIG cluster\r\nERROR\r\n";
        let mut reader = message.as_bytes();
        assert!(matches!(
            parse_nodes(&mut reader).await,
            Err(Error::InvalidCommand)
        ));
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let message = "node-1.use1.cache.amazonaws.com|10.0.0.1|11211 \
                       gibberish \
                       too|many|fields|here \
                       |10.0.0.2|11211 \
                       node-2.use1.cache.amazonaws.com|10.0.0.3|11212\n\
                       END\r\n";

        let mut reader = message.as_bytes();
        let nodes = parse_nodes(&mut reader).await.unwrap();
        assert_eq!(
            nodes,
            [
                Node::new("node-1.use1.cache.amazonaws.com:11211"),
                Node::new("node-2.use1.cache.amazonaws.com:11212"),
            ]
        );
    }

    #[tokio::test]
    async fn missing_payload_yields_no_nodes() {
        let message = "CONFIG cluster 0 2\r\n\r\nEND\r\n";
        let mut reader = message.as_bytes();
        let nodes = parse_nodes(&mut reader).await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn end_of_stream_returns_collected_nodes() {
        // No terminal END line; EOF closes the attempt cleanly.
        let message = "node-1.use1.cache.amazonaws.com|10.0.0.1|11211\n";
        let mut reader = message.as_bytes();
        let nodes = parse_nodes(&mut reader).await.unwrap();
        assert_eq!(nodes, [Node::new("node-1.use1.cache.amazonaws.com:11211")]);
    }

    #[tokio::test]
    async fn attempt_deadline_aborts_stalled_exchange() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Hold the accepted connection open without ever answering.
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config =
            DiscoveryConfig::new(addr.to_string()).io_timeout(Duration::from_millis(50));
        match fetch_nodes(&config).await.unwrap_err() {
            Error::Transport(io) => assert_eq!(io.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected transport timeout, got {:?}", other),
        }
    }

    #[test]
    fn config_defaults() {
        let config = DiscoveryConfig::new("example.cfg.use1.cache.amazonaws.com:11211");
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
        assert!(!config.rebuild_on_departure);
        assert!(config.io_timeout.is_none());
    }
}
