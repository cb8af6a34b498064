//! Shared primitive types used across the entire pipeline.

/// A store identifier, as supplied by the assignment table.
pub type StoreId = String;

/// A peer-group identifier.
pub type PeerGroupId = String;

/// A feature key at the configured granularity
/// (category, subcategory or SKU family).
pub type FeatureId = String;

/// The canonical run identifier used when results are persisted.
pub type RunId = String;
