// Domain layer - Chart data types and algorithms, no I/O
pub mod aggregation;
pub mod coordinates;
pub mod error;
pub mod interval;
pub mod interval_cache;
pub mod nearest;
pub mod ticks;
pub mod time_series;
