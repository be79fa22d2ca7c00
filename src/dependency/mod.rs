mod graph;

pub use graph::*;
