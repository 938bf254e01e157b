//! ICMP echo prober
//!
//! Performs exactly one latency measurement per call. Transport faults
//! during a probe are mapped to a `FailureReason`; only opening the
//! transport can fail.

use async_trait::async_trait;
use log::{debug, info};
use probe_common::{FailureReason, ProbeOutcome, ECHO_PAYLOAD_SIZE};
use std::{io, net::IpAddr, time::Duration};
use surge_ping::{Client, Config, Pinger, PingIdentifier, PingSequence, SurgeError, ICMP};
use thiserror::Error;
use tokio::time::timeout;

/// Errors raised while opening the probe transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Hostname lookup failed
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Hostname lookup returned nothing
    #[error("no address found for {0}")]
    NoAddress(String),

    /// ICMP socket could not be opened
    #[error("failed to open ICMP socket (raw sockets need root or CAP_NET_RAW): {0}")]
    Socket(#[source] io::Error),
}

/// One latency measurement per call against a fixed target
#[async_trait]
pub trait Prober: Send {
    /// Target as given by the operator
    fn target(&self) -> &str;

    /// Send one echo request and wait for its reply or the timeout
    async fn probe(&mut self) -> ProbeOutcome;
}

/// Prober sending ICMP echo requests through `surge-ping`
pub struct IcmpProber {
    target: String,
    addr: IpAddr,
    // Dropping the client tears down its receive task and every pinger with it
    _client: Client,
    pinger: Pinger,
    timeout: Duration,
    sequence: u16,
    payload: Vec<u8>,
}

impl IcmpProber {
    /// Resolve `target` and open the ICMP socket
    ///
    /// # Arguments
    ///
    /// * `target` - IP address or hostname
    /// * `probe_timeout` - Maximum wait for each echo reply
    pub async fn connect(target: &str, probe_timeout: Duration) -> Result<Self, TransportError> {
        let addr = resolve_host(target).await?;
        info!("Resolved {} to {}", target, addr);

        let config = match addr {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config).map_err(TransportError::Socket)?;

        let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
        pinger.timeout(probe_timeout);

        Ok(Self {
            target: target.to_string(),
            addr,
            _client: client,
            pinger,
            timeout: probe_timeout,
            sequence: 0,
            payload: vec![0; ECHO_PAYLOAD_SIZE],
        })
    }

    /// Resolved address of the target
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
}

#[async_trait]
impl Prober for IcmpProber {
    fn target(&self) -> &str {
        &self.target
    }

    async fn probe(&mut self) -> ProbeOutcome {
        let sequence = PingSequence(self.sequence);
        self.sequence = self.sequence.wrapping_add(1);

        match timeout(self.timeout, self.pinger.ping(sequence, &self.payload)).await {
            Ok(Ok((_, rtt))) => {
                debug!("Reply from {}: seq={} time={:?}", self.addr, sequence.0, rtt);
                ProbeOutcome::success(rtt)
            }
            Ok(Err(e)) => {
                let reason = classify_error(&e);
                debug!("Probe to {} failed ({}): {}", self.addr, reason, e);
                ProbeOutcome::failure(reason)
            }
            Err(_) => {
                debug!("Probe to {} timed out after {:?}", self.addr, self.timeout);
                ProbeOutcome::failure(FailureReason::Timeout)
            }
        }
    }
}

/// Resolve hostname to IP address.
async fn resolve_host(host: &str) -> Result<IpAddr, TransportError> {
    // First, try to parse as an IP address directly
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host(format!("{host}:0"))
        .await
        .map_err(|source| TransportError::Resolve {
            target: host.to_string(),
            source,
        })?;

    addrs
        .map(|addr| addr.ip())
        .next()
        .ok_or_else(|| TransportError::NoAddress(host.to_string()))
}

/// Map a transport error of a single probe to a loss reason
fn classify_error(err: &SurgeError) -> FailureReason {
    match err {
        SurgeError::Timeout { .. } => FailureReason::Timeout,
        SurgeError::IOError(e) => classify_io_error(e),
        _ => FailureReason::Error,
    }
}

fn classify_io_error(err: &io::Error) -> FailureReason {
    match err.kind() {
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
            FailureReason::Unreachable
        }
        io::ErrorKind::TimedOut => FailureReason::Timeout,
        _ => FailureReason::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_host_ipv4() {
        let ip = resolve_host("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[tokio::test]
    async fn test_resolve_host_ipv6() {
        let ip = resolve_host("::1").await.unwrap();
        assert_eq!(ip, IpAddr::V6(std::net::Ipv6Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_resolve_host_invalid() {
        let err = resolve_host("definitely not a host name").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_loopback_probe_succeeds() {
        let mut prober = match IcmpProber::connect("127.0.0.1", Duration::from_secs(1)).await {
            Ok(prober) => prober,
            Err(TransportError::Socket(e)) => {
                eprintln!("skipping loopback ICMP test, no socket privilege: {}", e);
                return;
            }
            Err(e) => panic!("unexpected transport error: {}", e),
        };

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(prober.probe().await);
        }

        assert!(
            outcomes.iter().any(ProbeOutcome::is_success),
            "no reply from loopback: {:?}",
            outcomes
        );
        assert!(!outcomes.contains(&ProbeOutcome::failure(FailureReason::Error)));
    }

    #[test]
    fn test_classify_errors() {
        let timeout = SurgeError::Timeout {
            seq: PingSequence(7),
        };
        assert_eq!(classify_error(&timeout), FailureReason::Timeout);

        let unreachable = SurgeError::IOError(io::Error::from(io::ErrorKind::NetworkUnreachable));
        assert_eq!(classify_error(&unreachable), FailureReason::Unreachable);

        let host = SurgeError::IOError(io::Error::from(io::ErrorKind::HostUnreachable));
        assert_eq!(classify_error(&host), FailureReason::Unreachable);

        let other = SurgeError::IOError(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(classify_error(&other), FailureReason::Error);

        assert_eq!(classify_error(&SurgeError::IncorrectBufferSize), FailureReason::Error);
    }
}
