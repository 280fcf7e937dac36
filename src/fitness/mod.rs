// Fitness module organization
// Each submodule handles a specific aspect of fitness computation

pub mod difference;
pub mod metrics;

// Re-export commonly used types and functions
pub use difference::{difference_rgb_parallel, difference_rgb_rect, difference_rgb_region, difference_to_distance, pixel_offset};
pub use metrics::MetricsSnapshot;
