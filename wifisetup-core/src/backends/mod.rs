pub mod http;

#[cfg(feature = "backend_mock")]
pub mod mock;
