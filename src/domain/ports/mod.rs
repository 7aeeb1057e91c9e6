//! Ports: interfaces this core consumes but does not implement.

pub mod recommender;

pub use recommender::{Recommendation, Recommender};
