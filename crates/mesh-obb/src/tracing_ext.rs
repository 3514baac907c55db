//! Tracing helpers for OBB tree builds and queries.
//!
//! Enable output by installing a subscriber in the application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_obb=debug shows split decisions and tree statistics
//! ```
//!
//! # Targets
//!
//! - `mesh_obb::build`: build summaries, split decisions, degenerate fallbacks
//! - `mesh_obb::query`: traversal details
//! - `mesh_obb::timing`: operation timings
//! - `mesh_obb::perf`: fine-grained section timings (trace)

use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{debug, info, trace};

use crate::tree::TreeStatistics;

/// Enters an `obb_operation` span for its lifetime and logs how long the
/// operation took when dropped.
///
/// ```rust,ignore
/// use mesh_obb::tracing_ext::OperationTimer;
///
/// fn rebuild(cells: usize, points: usize) {
///     let _timer = OperationTimer::with_context("rebuild", cells, points);
///     // events logged here carry the operation, cells and points fields
/// }
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    _span: EnteredSpan,
}

impl OperationTimer {
    /// Start timing `name` over a mesh of the given size.
    pub fn with_context(name: &'static str, cell_count: usize, point_count: usize) -> Self {
        let span = tracing::info_span!(
            "obb_operation",
            operation = name,
            cells = cell_count,
            points = point_count
        )
        .entered();
        debug!(target: "mesh_obb::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            _span: span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

// The span field drops after this runs, so the completion event is still
// recorded inside the span.
impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_obb::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log the shape of a tree at debug level.
pub fn log_tree_stats(stats: &TreeStatistics, context: &str) {
    debug!(
        target: "mesh_obb::build",
        context = context,
        nodes = stats.node_count,
        leaves = stats.leaf_count,
        deepest_level = stats.deepest_level,
        obb_count = stats.obb_count,
        leaf_volume = format!("{:.4}", stats.total_leaf_volume),
        min_cells_per_leaf = stats.min_cells_per_leaf,
        max_cells_per_leaf = stats.max_cells_per_leaf,
        "OBB tree statistics"
    );
}

/// Time a section of code; the returned guard logs at trace level on drop.
#[must_use]
pub fn log_perf_section(name: &'static str) -> impl Drop {
    struct PerfGuard {
        name: &'static str,
        start: Instant,
    }
    impl Drop for PerfGuard {
        fn drop(&mut self) {
            trace!(
                target: "mesh_obb::perf",
                section = self.name,
                elapsed_us = self.start.elapsed().as_micros(),
                "Performance section completed"
            );
        }
    }
    PerfGuard {
        name,
        start: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Metadata, Subscriber};

    /// Tracks how deep inside spans each event is emitted.
    #[derive(Default)]
    struct DepthRecorder {
        depth: AtomicUsize,
        events_in_span: AtomicUsize,
        events_outside: AtomicUsize,
    }

    struct Recording(Arc<DepthRecorder>);

    impl Subscriber for Recording {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &Attributes<'_>) -> Id {
            Id::from_u64(1)
        }
        fn record(&self, _: &Id, _: &Record<'_>) {}
        fn record_follows_from(&self, _: &Id, _: &Id) {}
        fn event(&self, _: &Event<'_>) {
            if self.0.depth.load(Ordering::SeqCst) > 0 {
                self.0.events_in_span.fetch_add(1, Ordering::SeqCst);
            } else {
                self.0.events_outside.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn enter(&self, _: &Id) {
            self.0.depth.fetch_add(1, Ordering::SeqCst);
        }
        fn exit(&self, _: &Id) {
            self.0.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::with_context("test_operation", 12, 8);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_operation_timer_enters_its_span() {
        let recorder = Arc::new(DepthRecorder::default());
        tracing::subscriber::with_default(Recording(recorder.clone()), || {
            let timer = OperationTimer::with_context("test_operation", 12, 8);
            assert_eq!(recorder.depth.load(Ordering::SeqCst), 1);
            info!("inside the operation");
            drop(timer);
            assert_eq!(recorder.depth.load(Ordering::SeqCst), 0);
        });
        // start, inner and completion events
        assert_eq!(recorder.events_in_span.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.events_outside.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_log_helpers_do_not_panic() {
        log_tree_stats(&TreeStatistics::default(), "test");
        let _guard = log_perf_section("test_section");
    }
}
