// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use tts_core::OrchestratorEvent;

const LATENCY_SAMPLES: usize = 1000;

/// Per-endpoint request metrics
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<Vec<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        // keep the most recent samples only
        if let Ok(mut samples) = self.latency_samples.lock() {
            samples.push(latency_ms);
            if samples.len() > LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn percentile(&self, p: u8) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters fed by orchestrator events
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub chunks: Arc<AtomicU64>,
    pub audio_ms: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
    pub drains: Arc<AtomicU64>,
    pub overflows: Arc<AtomicU64>,
    pub errors: Arc<AtomicU64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, event: &OrchestratorEvent) {
        match event {
            OrchestratorEvent::Chunk { duration_ms, .. } => {
                self.chunks.fetch_add(1, Ordering::Relaxed);
                self.audio_ms.fetch_add(*duration_ms, Ordering::Relaxed);
            }
            OrchestratorEvent::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            OrchestratorEvent::Drained => {
                self.drains.fetch_add(1, Ordering::Relaxed);
            }
            OrchestratorEvent::Overflow { .. } => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
            }
            OrchestratorEvent::Error { .. } => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            OrchestratorEvent::Ready { .. } => {}
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            audio_ms: self.audio_ms.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub speak: EndpointMetrics,
    pub pipeline: PipelineMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub speak: EndpointStats,
    pub pipeline: PipelineStats,
}

#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub request_count: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PipelineStats {
    pub chunks: u64,
    pub audio_ms: u64,
    pub skipped: u64,
    pub drains: u64,
    pub overflows: u64,
    pub errors: u64,
}

/// Current process-wide CPU and memory usage.
pub fn system_metrics(request_count: u64, uptime_seconds: u64) -> SystemMetrics {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    SystemMetrics {
        cpu_usage_percent: system.global_cpu_info().cpu_usage(),
        memory_used_mb: system.used_memory() / 1024 / 1024,
        memory_total_mb: system.total_memory() / 1024 / 1024,
        request_count,
        uptime_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_latency_stats() {
        let metrics = EndpointMetrics::new();
        for latency in [10, 20, 30, 40] {
            metrics.record_request(latency);
        }
        metrics.record_error();

        let stats = metrics.stats();
        assert_eq!(stats.request_count, 4);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.max_latency_ms, 40);
        assert_eq!(stats.avg_latency_ms, 25.0);
        assert_eq!(stats.p50_latency_ms, 30);
    }

    #[test]
    fn test_pipeline_counts_events() {
        let metrics = PipelineMetrics::new();
        metrics.record_event(&OrchestratorEvent::Chunk {
            generation: 0,
            duration_ms: 120,
            pause_ms: 180,
            wav_base64: None,
        });
        metrics.record_event(&OrchestratorEvent::Drained);
        metrics.record_event(&OrchestratorEvent::Overflow { dropped_samples: 10 });

        let stats = metrics.stats();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.audio_ms, 120);
        assert_eq!(stats.drains, 1);
        assert_eq!(stats.overflows, 1);
        assert_eq!(stats.errors, 0);
    }
}
