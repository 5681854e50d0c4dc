pub mod ranker;

pub use ranker::{dedupe_hits, HitRanker};
