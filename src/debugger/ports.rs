//! Debug port housekeeping
//!
//! A JVM left over from an earlier task keeps the JDWP port bound and
//! makes the next attach fail, so holders are killed before every start
//! and after every close.

use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on kill rounds, so a respawning holder cannot spin forever
const MAX_KILL_ROUNDS: usize = 25;

/// Processes with a socket bound to `port`
pub async fn pids_on_port(port: u16) -> Vec<u32> {
    let output = Command::new("lsof")
        .arg("-t")
        .arg(format!("-i:{}", port))
        .output()
        .await;

    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect(),
        Err(e) => {
            debug!(error = %e, "lsof unavailable");
            Vec::new()
        }
    }
}

/// Kill every process bound to `port` until none is left
pub async fn kill_port_holders(port: u16) {
    let own = std::process::id();

    for _ in 0..MAX_KILL_ROUNDS {
        let pids: Vec<u32> = pids_on_port(port).await.into_iter().filter(|p| *p != own).collect();
        if pids.is_empty() {
            return;
        }

        let mut sys = System::new();
        sys.refresh_processes();
        for pid in pids {
            if let Some(process) = sys.process(Pid::from_u32(pid)) {
                info!(pid, name = %process.name(), port, "killing debug port holder");
                process.kill();
            }
        }
        sleep(POLL_INTERVAL).await;
    }
    warn!(port, "debug port still bound after repeated kills");
}

/// Poll until something accepts connections on `port`
pub async fn wait_for_port(port: u16, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;

    while Instant::now() < deadline {
        if let Ok(Ok(_stream)) = timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await {
            debug!(port, "debug port is open");
            sleep(POLL_INTERVAL).await;
            return true;
        }
        sleep(POLL_INTERVAL).await;
    }
    warn!(port, "timed out waiting for debug port");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_wait_for_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(wait_for_port(port, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_for_closed_port_times_out() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let start = Instant::now();
        assert!(!wait_for_port(port, Duration::from_millis(300)).await);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
