pub mod elastic;
pub mod graph;
pub mod refine;
pub mod scoped;
pub mod segments;
pub mod tokenization;
pub mod viterbi;
