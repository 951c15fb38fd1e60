//! Wire protocol definitions for the proxy RPC
//!
//! A frame is a 24-byte big-endian header followed by `body_len` bytes of
//! MessagePack body. Keep-alive pings carry no body.

pub mod codec;
pub mod command;
pub mod error;
pub mod response;
pub mod types;

pub use codec::{
    Header, Packet, PacketDecoder, PacketEncoder, CMD_PING, CMD_QUERY, HEADER_LEN, MAGIC,
    MAX_BODY_SIZE,
};
pub use command::{
    CommandName, DeleteRequest, InsertRequest, Request, RequestBody, SelectRequest,
    TransferRequest, UpdateRequest,
};
pub use error::CodecError;
pub use response::{
    AffectedResponse, InsertResponse, Response, ResponseBody, SelectResponse, TransferResponse,
};
pub use types::{StoreRecord, StoreUnit, TransferCommand};
