mod random_slowdown;

#[allow(unused_imports)]
pub use random_slowdown::slowdown_request;
