use crate::{Codec, ser_err};
use razor_cluster_core::error::RpcIntErr;
use serde::{Deserialize, Serialize};

/// Plain JSON, registered as `json`
#[derive(Default, Clone, Copy, Debug)]
pub struct JsonCodec();

impl Codec for JsonCodec {
    const NAME: &'static str = "json";

    #[inline]
    fn encode<T: Serialize>(&self, task: &T) -> Result<Vec<u8>, RpcIntErr> {
        serde_json::to_vec(task).map_err(ser_err)
    }

    #[inline]
    fn encode_into<T: Serialize>(&self, task: &T, buf: &mut Vec<u8>) -> Result<usize, RpcIntErr> {
        let pre_len = buf.len();
        serde_json::to_writer(&mut *buf, task).map_err(ser_err)?;
        Ok(buf.len() - pre_len)
    }

    #[inline]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcIntErr> {
        serde_json::from_slice(buf).map_err(ser_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializer;

    #[test]
    fn test_json_null_for_empty() {
        let codec = JsonCodec::default();
        let dyn_codec: &dyn Serializer = &codec;
        let unit: () = dyn_codec.decode(&[]).unwrap();
        assert_eq!(unit, ());
        let none: Option<u32> = dyn_codec.decode(&[]).unwrap();
        assert_eq!(none, None);
        let res: Result<u32, _> = dyn_codec.decode(&[]);
        assert!(res.is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        let codec = JsonCodec::default();
        let res: Result<u32, _> = codec.decode(b"12 }");
        assert!(matches!(res, Err(RpcIntErr::Serialization(_))));
    }
}
