// Generated by tonic-build from proto/*.proto (see build.rs)

// Include file descriptor for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("diecast_descriptor");

pub mod common {
    include!("diecast.common.rs");
}

pub mod inventory {
    include!("diecast.inventory.rs");
}

pub mod health {
    include!("diecast.health.rs");
}
