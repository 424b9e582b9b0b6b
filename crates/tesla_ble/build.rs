//! Compiles the `.proto` schema under `proto/` into Rust types at build
//! time. The `.proto` files are the "static schema descriptor" the spec asks
//! implementations to ship: they are the wire-compatibility contract with
//! real vehicles, checked into the crate rather than generated from
//! anything else.

fn main() {
    let proto_files = [
        "proto/common.proto",
        "proto/signatures.proto",
        "proto/universal_message.proto",
        "proto/car_server.proto",
        "proto/vcsec.proto",
    ];

    for file in &proto_files {
        println!("cargo:rerun-if-changed={file}");
    }

    prost_build::compile_protos(&proto_files, &["proto/"]).expect("failed to compile Tesla BLE protobuf schema");
}
