//! Wire-format pack/unpack delegated to `hickory-proto`.

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use tundns_domain::TunDnsError;

pub fn pack(message: &Message) -> Result<Vec<u8>, TunDnsError> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    message
        .emit(&mut encoder)
        .map_err(|e| TunDnsError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes into an owned message; nothing borrows from `bytes` afterwards.
pub fn unpack(bytes: &[u8]) -> Result<Message, TunDnsError> {
    Message::from_vec(bytes).map_err(|e| TunDnsError::Decode(e.to_string()))
}
