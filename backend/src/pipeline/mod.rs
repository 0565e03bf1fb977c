pub mod inspect;
pub mod normalize;
pub mod orchestrator;
pub mod writer;
