pub mod correlation;
pub mod events;
pub mod fingerprints;
pub mod live;
pub mod network;
pub mod sessions;
pub mod snapshots;
