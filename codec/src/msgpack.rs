use crate::{Codec, ser_err};
use razor_cluster_core::error::RpcIntErr;
use serde::{Deserialize, Serialize};

/// MessagePack with named struct fields, registered as `msgpack`
#[derive(Default, Clone, Copy, Debug)]
pub struct MsgpCodec();

impl Codec for MsgpCodec {
    const NAME: &'static str = "msgpack";

    #[inline(always)]
    fn encode<T: Serialize>(&self, task: &T) -> Result<Vec<u8>, RpcIntErr> {
        rmp_serde::encode::to_vec_named(task).map_err(ser_err)
    }

    #[inline(always)]
    fn encode_into<T: Serialize>(&self, task: &T, buf: &mut Vec<u8>) -> Result<usize, RpcIntErr> {
        let pre_len = buf.len();
        rmp_serde::encode::write_named(buf, task).map_err(ser_err)?;
        Ok(buf.len() - pre_len)
    }

    #[inline(always)]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcIntErr> {
        rmp_serde::decode::from_slice(buf).map_err(ser_err)
    }
}
