//! Generated protobuf types, nested to mirror the `.proto` package paths so
//! that prost's cross-package `super::` references resolve correctly.

pub mod tesla {
    pub mod ble {
        pub mod common {
            include!(concat!(env!("OUT_DIR"), "/tesla.ble.common.rs"));
        }
        pub mod signatures {
            include!(concat!(env!("OUT_DIR"), "/tesla.ble.signatures.rs"));
        }
        pub mod universal_message {
            include!(concat!(env!("OUT_DIR"), "/tesla.ble.universal_message.rs"));
        }
        pub mod car_server {
            include!(concat!(env!("OUT_DIR"), "/tesla.ble.car_server.rs"));
        }
        pub mod vcsec {
            include!(concat!(env!("OUT_DIR"), "/tesla.ble.vcsec.rs"));
        }
    }
}
