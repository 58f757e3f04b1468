pub mod lease_service;
pub mod server;

pub use lease_service::LeaseServiceImpl;
pub use server::GrpcServer;
