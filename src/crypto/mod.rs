pub mod signing;

pub use signing::{
    read_key, read_signature, sign_bytes, sign_file, verify_bytes, verify_file_signature,
    write_signature,
};
