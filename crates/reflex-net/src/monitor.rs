//! Network health: rolling RTT statistics, inbound packet rate, and an idle
//! watchdog that turns a silent connection into a read-timeout report.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use reflex_config::MonitorConfig;

/// Packet arrival timestamps older than this are discarded.
const PACKET_RETENTION: Duration = Duration::from_secs(60);

/// Samples averaged on each side of the trend comparison.
const TREND_SPAN: usize = 5;

/// Mean change (ms) the trend must exceed before it is reported as moving.
const TREND_DEAD_BAND_MS: f64 = 10.0;

/// Direction recent round-trip times are heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingTrend {
    /// Latency is improving.
    Decreasing,
    /// No significant movement, or too few samples to tell.
    #[default]
    Stable,
    /// Latency is getting worse.
    Increasing,
}

/// Immutable snapshot of connection health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthSnapshot {
    /// Most recent RTT sample in milliseconds.
    pub current_ms: Option<u32>,
    /// Smallest RTT in the window.
    pub min_ms: Option<u32>,
    /// Largest RTT in the window.
    pub max_ms: Option<u32>,
    /// Mean RTT in the window.
    pub average_ms: Option<f64>,
    /// Mean absolute difference between consecutive samples.
    pub jitter_ms: Option<f64>,
    /// Recent direction of travel.
    pub trend: PingTrend,
    /// Packets received within the stats window.
    pub packets_in_window: usize,
    /// Number of RTT samples held.
    pub sample_count: usize,
}

/// Rolling health tracker fed from the main context.
pub struct HealthMonitor {
    history_size: usize,
    stats_window: Duration,
    rtt_samples: VecDeque<u32>,
    packet_times: VecDeque<Instant>,
    last_packet: Option<Instant>,
    idle_reported: bool,
}

impl HealthMonitor {
    /// Create an empty monitor.
    pub fn new(config: &MonitorConfig) -> Self {
        let history_size = config.ping_history_size.max(1);
        Self {
            history_size,
            stats_window: Duration::from_secs(config.stats_window_secs),
            rtt_samples: VecDeque::with_capacity(history_size),
            packet_times: VecDeque::new(),
            last_packet: None,
            idle_reported: false,
        }
    }

    /// Apply a reloaded config, trimming history if it shrank.
    pub fn update_config(&mut self, config: &MonitorConfig) {
        self.history_size = config.ping_history_size.max(1);
        self.stats_window = Duration::from_secs(config.stats_window_secs);
        while self.rtt_samples.len() > self.history_size {
            self.rtt_samples.pop_front();
        }
    }

    /// Record one inbound packet.
    pub fn report_packet_received(&mut self, now: Instant) {
        self.packet_times.push_back(now);
        self.last_packet = Some(now);
        self.idle_reported = false;

        while let Some(&front) = self.packet_times.front() {
            if now.saturating_duration_since(front) > PACKET_RETENTION {
                self.packet_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record one round-trip sample. Negative samples are ignored.
    pub fn report_round_trip_sample(&mut self, ms: i64) {
        let Ok(ms) = u32::try_from(ms) else {
            tracing::trace!(ms, "Ignoring out-of-range RTT sample");
            return;
        };
        if self.rtt_samples.len() >= self.history_size {
            self.rtt_samples.pop_front();
        }
        self.rtt_samples.push_back(ms);
    }

    /// Most recent sample.
    pub fn current_ping(&self) -> Option<u32> {
        self.rtt_samples.back().copied()
    }

    /// Smallest sample in the window.
    pub fn min_ping(&self) -> Option<u32> {
        self.rtt_samples.iter().min().copied()
    }

    /// Largest sample in the window.
    pub fn max_ping(&self) -> Option<u32> {
        self.rtt_samples.iter().max().copied()
    }

    /// Mean of the window.
    pub fn average_ping(&self) -> Option<f64> {
        mean(self.rtt_samples.iter().copied())
    }

    /// Mean absolute difference of consecutive samples.
    pub fn jitter(&self) -> Option<f64> {
        if self.rtt_samples.len() < 2 {
            return None;
        }
        let diffs = self
            .rtt_samples
            .iter()
            .zip(self.rtt_samples.iter().skip(1))
            .map(|(a, b)| a.abs_diff(*b));
        mean(diffs)
    }

    /// Compare the mean of the latest five samples against the five before.
    pub fn trend(&self) -> PingTrend {
        let n = self.rtt_samples.len();
        if n < TREND_SPAN * 2 {
            return PingTrend::Stable;
        }
        let recent = mean(self.rtt_samples.range(n - TREND_SPAN..).copied());
        let previous = mean(
            self.rtt_samples
                .range(n - TREND_SPAN * 2..n - TREND_SPAN)
                .copied(),
        );
        match (recent, previous) {
            (Some(r), Some(p)) if r - p > TREND_DEAD_BAND_MS => PingTrend::Increasing,
            (Some(r), Some(p)) if p - r > TREND_DEAD_BAND_MS => PingTrend::Decreasing,
            _ => PingTrend::Stable,
        }
    }

    /// Packets received within the stats window ending at `now`.
    pub fn packets_in_window(&self, now: Instant) -> usize {
        self.packet_times
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= self.stats_window)
            .count()
    }

    /// Time since the last inbound packet, if any has arrived.
    pub fn time_since_last_packet(&self, now: Instant) -> Option<Duration> {
        self.last_packet
            .map(|last| now.saturating_duration_since(last))
    }

    /// Returns `true` once per idle stretch longer than `read_timeout`.
    ///
    /// Nothing is reported before the first packet.
    pub fn check_idle(&mut self, now: Instant, read_timeout: Duration) -> bool {
        match self.time_since_last_packet(now) {
            Some(idle) if idle > read_timeout && !self.idle_reported => {
                self.idle_reported = true;
                true
            }
            _ => false,
        }
    }

    /// A new connection is up. Arms the idle watchdog from `now` and starts a
    /// fresh packet window; round-trip history carries over.
    pub fn mark_connected(&mut self, now: Instant) {
        self.packet_times.clear();
        self.last_packet = Some(now);
        self.idle_reported = false;
    }

    /// Snapshot of all statistics at `now`.
    pub fn snapshot(&self, now: Instant) -> HealthSnapshot {
        HealthSnapshot {
            current_ms: self.current_ping(),
            min_ms: self.min_ping(),
            max_ms: self.max_ping(),
            average_ms: self.average_ping(),
            jitter_ms: self.jitter(),
            trend: self.trend(),
            packets_in_window: self.packets_in_window(now),
            sample_count: self.rtt_samples.len(),
        }
    }
}

fn mean(values: impl Iterator<Item = u32>) -> Option<f64> {
    let (sum, count) = values.fold((0u64, 0u32), |(s, c), v| (s + u64::from(v), c + 1));
    (count > 0).then(|| sum as f64 / f64::from(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(history: usize) -> HealthMonitor {
        HealthMonitor::new(&MonitorConfig {
            ping_history_size: history,
            stats_window_secs: 10,
        })
    }

    #[test]
    fn test_empty_monitor_has_no_stats() {
        let m = monitor(100);
        assert_eq!(m.current_ping(), None);
        assert_eq!(m.average_ping(), None);
        assert_eq!(m.jitter(), None);
        assert_eq!(m.trend(), PingTrend::Stable);
    }

    #[test]
    fn test_basic_statistics() {
        let mut m = monitor(100);
        for ms in [50, 70, 60] {
            m.report_round_trip_sample(ms);
        }
        assert_eq!(m.current_ping(), Some(60));
        assert_eq!(m.min_ping(), Some(50));
        assert_eq!(m.max_ping(), Some(70));
        assert_eq!(m.average_ping(), Some(60.0));
        // |70-50| + |60-70| = 30 over 2 pairs
        assert_eq!(m.jitter(), Some(15.0));
    }

    #[test]
    fn test_negative_samples_ignored() {
        let mut m = monitor(100);
        m.report_round_trip_sample(-1);
        assert_eq!(m.current_ping(), None);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut m = monitor(10);
        for ms in 0..25 {
            m.report_round_trip_sample(ms);
        }
        assert_eq!(m.snapshot(Instant::now()).sample_count, 10);
        assert_eq!(m.min_ping(), Some(15));
    }

    #[test]
    fn test_trend_detection() {
        let mut rising = monitor(100);
        for ms in [40, 40, 40, 40, 40, 80, 80, 80, 80, 80] {
            rising.report_round_trip_sample(ms);
        }
        assert_eq!(rising.trend(), PingTrend::Increasing);

        let mut falling = monitor(100);
        for ms in [80, 80, 80, 80, 80, 40, 40, 40, 40, 40] {
            falling.report_round_trip_sample(ms);
        }
        assert_eq!(falling.trend(), PingTrend::Decreasing);

        let mut flat = monitor(100);
        for ms in [50, 52, 48, 50, 51, 55, 57, 53, 55, 56] {
            flat.report_round_trip_sample(ms);
        }
        assert_eq!(flat.trend(), PingTrend::Stable, "within the dead band");
    }

    #[test]
    fn test_trend_needs_ten_samples() {
        let mut m = monitor(100);
        for ms in [10, 10, 10, 10, 500, 500, 500, 500, 500] {
            m.report_round_trip_sample(ms);
        }
        assert_eq!(m.trend(), PingTrend::Stable);
    }

    #[test]
    fn test_packets_in_window() {
        let mut m = monitor(100);
        let start = Instant::now();
        m.report_packet_received(start);
        m.report_packet_received(start + Duration::from_secs(5));
        m.report_packet_received(start + Duration::from_secs(12));

        let now = start + Duration::from_secs(12);
        assert_eq!(m.packets_in_window(now), 2);
        assert_eq!(m.time_since_last_packet(now), Some(Duration::ZERO));
    }

    #[test]
    fn test_old_packets_pruned() {
        let mut m = monitor(100);
        let start = Instant::now();
        m.report_packet_received(start);
        m.report_packet_received(start + Duration::from_secs(61));
        assert_eq!(m.packet_times.len(), 1);
    }

    #[test]
    fn test_idle_watchdog_fires_once_per_stretch() {
        let mut m = monitor(100);
        let start = Instant::now();
        let timeout = Duration::from_secs(45);
        assert!(!m.check_idle(start + Duration::from_secs(100), timeout));

        m.report_packet_received(start);
        assert!(!m.check_idle(start + Duration::from_secs(30), timeout));
        assert!(m.check_idle(start + Duration::from_secs(46), timeout));
        assert!(!m.check_idle(start + Duration::from_secs(90), timeout));

        m.report_packet_received(start + Duration::from_secs(100));
        assert!(m.check_idle(start + Duration::from_secs(146), timeout));
    }

    #[test]
    fn test_mark_connected_arms_watchdog_without_counting_a_packet() {
        let mut m = monitor(100);
        let start = Instant::now();
        let timeout = Duration::from_secs(45);
        m.report_packet_received(start);
        m.report_round_trip_sample(40);
        assert!(m.check_idle(start + Duration::from_secs(50), timeout));

        let reconnect = start + Duration::from_secs(60);
        m.mark_connected(reconnect);
        assert_eq!(m.packets_in_window(reconnect), 0);
        assert_eq!(m.time_since_last_packet(reconnect), Some(Duration::ZERO));
        assert_eq!(m.snapshot(reconnect).sample_count, 1);

        assert!(!m.check_idle(reconnect + Duration::from_secs(45), timeout));
        assert!(m.check_idle(reconnect + Duration::from_secs(46), timeout));
    }
}
