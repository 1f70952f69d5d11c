use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::scheduler::job::DEFAULT_MAX_RETRIES;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Retry bound stamped on every submitted job.
    pub max_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Listen on `port` of the given IPv4 or IPv6 address.
    pub fn bind(ip: IpAddr, port: u16) -> Self {
        Self::new(SocketAddr::new(ip, port))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// How a worker turns a claimed job into a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorConfig {
    /// Sleep, then pass with the given probability.
    Simulated { duration: Duration, pass_rate: f64 },
    /// Run `sh -c "<command> <test_path>"`; exit code 0 passes.
    Command { command: String },
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig::Simulated {
            duration: Duration::from_secs(3),
            pass_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub server_url: String,
    /// Consecutive empty polls before the worker exits.
    pub max_idle_cycles: u32,
    /// Sleep after an empty poll.
    pub poll_interval: Duration,
    /// Sleep after a failed call to the server.
    pub transport_backoff: Duration,
    /// Consecutive failed calls to the server before the worker gives up.
    pub max_transport_failures: u32,
    /// Attempts at delivering one completion report.
    pub report_attempts: u32,
    pub executor: ExecutorConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_idle_cycles: 5,
            poll_interval: Duration::from_secs(2),
            transport_backoff: Duration::from_secs(2),
            max_transport_failures: 10,
            report_attempts: 3,
            executor: ExecutorConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn with_max_idle_cycles(mut self, max_idle_cycles: u32) -> Self {
        self.max_idle_cycles = max_idle_cycles;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_transport_backoff(mut self, transport_backoff: Duration) -> Self {
        self.transport_backoff = transport_backoff;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    /// Delay between status polls while waiting for a terminal state.
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn server_config_new() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr).with_max_retries(5);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.max_retries, 5);
    }

    #[test]
    fn server_config_binds_ipv6() {
        let cfg = ServerConfig::bind("::".parse().unwrap(), 8000);
        assert_eq!(cfg.listen_addr.to_string(), "[::]:8000");
        assert!(cfg.listen_addr.is_ipv6());

        let cfg = ServerConfig::bind("127.0.0.1".parse().unwrap(), 9000);
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn worker_config_default() {
        let cfg = WorkerConfig::default();
        assert!(cfg.worker_id.starts_with("worker-"));
        assert_eq!(cfg.server_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.max_idle_cycles, 5);
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.transport_backoff, Duration::from_secs(2));
        assert_eq!(cfg.max_transport_failures, 10);
        assert_eq!(cfg.report_attempts, 3);
        assert_eq!(
            cfg.executor,
            ExecutorConfig::Simulated {
                duration: Duration::from_secs(3),
                pass_rate: 0.5
            }
        );
    }

    #[test]
    fn worker_config_builders() {
        let cfg = WorkerConfig::new("w-1")
            .with_server_url("http://10.0.0.5:8000")
            .with_max_idle_cycles(1)
            .with_poll_interval(Duration::from_millis(10))
            .with_transport_backoff(Duration::from_millis(20))
            .with_executor(ExecutorConfig::Command {
                command: "npx appwright test".to_string(),
            });
        assert_eq!(cfg.worker_id, "w-1");
        assert_eq!(cfg.server_url, "http://10.0.0.5:8000");
        assert_eq!(cfg.max_idle_cycles, 1);
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
        assert_eq!(cfg.transport_backoff, Duration::from_millis(20));
        assert!(matches!(cfg.executor, ExecutorConfig::Command { .. }));
    }

    #[test]
    fn client_config_default() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.server_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));

        let cfg = ClientConfig::new("http://queue:8000");
        assert_eq!(cfg.server_url, "http://queue:8000");
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    }
}
