// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Counters for streamed chat turns
#[derive(Debug)]
pub struct TurnMetrics {
    started_at: Instant,
    request_count: AtomicU64,
    turns_started: AtomicU64,
    turns_completed: AtomicU64,
    turns_failed: AtomicU64,
    turns_aborted: AtomicU64,
    audio_clips: AtomicU64,
    // Completed-turn latencies, most recent last
    latency_samples: Mutex<Vec<u64>>,
}

impl TurnMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            request_count: AtomicU64::new(0),
            turns_started: AtomicU64::new(0),
            turns_completed: AtomicU64::new(0),
            turns_failed: AtomicU64::new(0),
            turns_aborted: AtomicU64::new(0),
            audio_clips: AtomicU64::new(0),
            latency_samples: Mutex::new(Vec::new()),
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_started(&self) {
        self.turns_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_completed(&self, latency_ms: u64) {
        self.turns_completed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut samples) = self.latency_samples.lock() {
            samples.push(latency_ms);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    pub fn turn_failed(&self) {
        self.turns_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_aborted(&self) {
        self.turns_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn audio_clip(&self) {
        self.audio_clips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TurnStats {
        let (avg, p95) = match self.latency_samples.lock() {
            Ok(samples) if !samples.is_empty() => {
                let avg = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
                let mut sorted = samples.clone();
                sorted.sort_unstable();
                let index = (sorted.len() * 95 / 100).min(sorted.len() - 1);
                (avg, sorted[index])
            }
            _ => (0.0, 0),
        };

        TurnStats {
            turns_started: self.turns_started.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
            turns_aborted: self.turns_aborted.load(Ordering::Relaxed),
            audio_clips: self.audio_clips.load(Ordering::Relaxed),
            avg_turn_latency_ms: avg,
            p95_turn_latency_ms: p95,
        }
    }
}

impl Default for TurnMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct TurnStats {
    pub turns_started: u64,
    pub turns_completed: u64,
    pub turns_failed: u64,
    pub turns_aborted: u64,
    pub audio_clips: u64,
    pub avg_turn_latency_ms: f64,
    pub p95_turn_latency_ms: u64,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub turns: TurnStats,
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    // Unix-like systems only
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|l| l.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    let metrics = &state.metrics;
    Json(MetricsResponse {
        timestamp: Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: metrics.request_count.load(Ordering::Relaxed),
            uptime_seconds: metrics.started_at.elapsed().as_secs(),
            system_load,
        },
        turns: metrics.snapshot(),
    })
}
