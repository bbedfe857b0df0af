pub mod inspector;
pub mod plot;
pub mod sampler;
pub mod session;
