//! Document Series Allocator domain model.
//!
//! Selection and formatting live here; the atomic read-increment-persist of
//! `next_number` is done by the store inside the caller's transaction.

pub mod series;

pub use series::{DocumentSeries, SeriesPatch, SeriesScope, select_series};
