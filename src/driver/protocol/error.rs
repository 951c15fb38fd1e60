use thiserror::Error;

/// Failure while framing or unframing a packet
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("deserialization failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    #[error("body of {0} bytes exceeds the frame limit")]
    TooLarge(usize),
}
