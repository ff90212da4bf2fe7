mod tpm2;

pub use tpm2::*;
