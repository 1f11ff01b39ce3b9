//! Platform-agnostic process sampling used by the monitoring loop.
//!
//! Only a Linux `/proc` implementation ships; other platforms fall back to
//! [`NullSampler`], which reports no usage and never trips a breach.

/// One point-in-time resource reading for a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sample {
    pub cpu_pct: f64,
    pub rss_bytes: u64,
    pub file_descriptors: u64,
}

pub trait ProcessSampler: Send + Sync {
    /// Returns `None` once the process can no longer be sampled (exited).
    fn sample(&mut self, pid: u32) -> Option<Sample>;
}

/// Reads `/proc/<pid>/stat`, `/proc/<pid>/status`, and counts entries under
/// `/proc/<pid>/fd` to approximate CPU%, RSS, and open file descriptors.
#[cfg(target_os = "linux")]
pub struct LinuxProcSampler {
    clock_ticks_per_sec: u64,
    page_size_bytes: u64,
    last_cpu_ticks: Option<u64>,
    last_sample_at: Option<std::time::Instant>,
}

#[cfg(target_os = "linux")]
impl Default for LinuxProcSampler {
    fn default() -> Self {
        Self {
            clock_ticks_per_sec: 100,
            page_size_bytes: 4096,
            last_cpu_ticks: None,
            last_sample_at: None,
        }
    }
}

#[cfg(target_os = "linux")]
impl LinuxProcSampler {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_stat(&self, pid: u32) -> Option<(u64, u64)> {
        let raw = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let after_comm = raw.rsplit_once(')')?.1;
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        // Fields are 0-indexed starting after `(comm)`; utime is field 14 (index 11
        // here), stime is field 15 (index 12), rss (pages) is field 24 (index 21).
        let utime: u64 = fields.get(11)?.parse().ok()?;
        let stime: u64 = fields.get(12)?.parse().ok()?;
        let rss_pages: u64 = fields.get(21)?.parse().ok()?;
        Some((utime + stime, rss_pages))
    }

    fn count_fds(&self, pid: u32) -> u64 {
        std::fs::read_dir(format!("/proc/{pid}/fd"))
            .map(|entries| entries.count() as u64)
            .unwrap_or(0)
    }
}

#[cfg(target_os = "linux")]
impl ProcessSampler for LinuxProcSampler {
    fn sample(&mut self, pid: u32) -> Option<Sample> {
        let (total_ticks, rss_pages) = self.read_stat(pid)?;
        let now = std::time::Instant::now();

        let cpu_pct = match (self.last_cpu_ticks, self.last_sample_at) {
            (Some(prev_ticks), Some(prev_at)) => {
                let tick_delta = total_ticks.saturating_sub(prev_ticks) as f64;
                let secs_delta = now.duration_since(prev_at).as_secs_f64().max(0.001);
                (tick_delta / self.clock_ticks_per_sec as f64 / secs_delta) * 100.0
            }
            _ => 0.0,
        };
        self.last_cpu_ticks = Some(total_ticks);
        self.last_sample_at = Some(now);

        Some(Sample {
            cpu_pct,
            rss_bytes: rss_pages * self.page_size_bytes,
            file_descriptors: self.count_fds(pid),
        })
    }
}

/// No-op sampler for platforms without a `/proc`-style interface.
#[derive(Debug, Default)]
pub struct NullSampler;

impl ProcessSampler for NullSampler {
    fn sample(&mut self, _pid: u32) -> Option<Sample> {
        None
    }
}

/// Constructs the best sampler available on the current target.
pub fn default_sampler() -> Box<dyn ProcessSampler> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxProcSampler::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NullSampler)
    }
}
