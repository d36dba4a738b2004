pub mod common;
pub mod cost;
pub mod hardware;
pub mod loops;
pub mod mapping;
pub mod onnx;
pub mod stage;
pub mod utils;
pub mod workload;
