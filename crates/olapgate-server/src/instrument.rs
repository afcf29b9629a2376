//! Execution statistics logged when a query completes.

use olapgate_core::ExecutionHandle;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const MIB: f64 = 1024.0 * 1024.0;
/// Keeps rates finite for queries that finish within the clock resolution.
const MIN_ELAPSED: Duration = Duration::from_micros(1);

/// Wall clock timer started just before the query is handed to the engine.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Rows and bytes read by the leaf of a plan over some duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub rows: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.max(MIN_ELAPSED).as_secs_f64();
        let mib = self.bytes as f64 / MIB;
        write!(
            f,
            "Read {} rows, {:.3} MiB in {:.3} sec., {:.3} rows/sec., {:.3} MiB/sec.",
            self.rows,
            mib,
            secs,
            self.rows as f64 / secs,
            mib / secs
        )
    }
}

/// Log the plan and throughput of a finished query.
pub fn record(handle: Option<&dyn ExecutionHandle>, elapsed: Duration) {
    let Some(handle) = handle else {
        debug!("Query finished in {:.3} sec.", elapsed.as_secs_f64());
        return;
    };

    debug!("Query pipeline:\n{}", handle.plan_dump());

    match handle.leaf_rows_bytes() {
        Ok(stats) if stats.rows > 0 => {
            let throughput = Throughput {
                rows: stats.rows,
                bytes: stats.bytes,
                elapsed,
            };
            info!("{}", throughput);
        }
        Ok(_) => debug!("Query finished in {:.3} sec.", elapsed.as_secs_f64()),
        Err(err) => debug!(error = %err, "No read statistics for query"),
    }
}
