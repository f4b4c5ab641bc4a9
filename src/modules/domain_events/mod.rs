pub mod emitter;
pub mod model;
