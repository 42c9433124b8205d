// Leaves first: each module only depends on the ones listed above it.
pub mod frame;
pub mod geometry;
pub mod darkest_region;
pub mod threshold_bank;
pub mod ellipse;
pub mod contour_analyzer;
pub mod threshold_selector;
pub mod contour_refiner;
pub mod lock_gate;
pub mod command;
pub mod annotate;
