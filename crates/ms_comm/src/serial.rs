// crates/ms_comm/src/serial.rs

//! 单进程通信器

use crate::error::{CommError, CommResult};
use crate::traits::Communicator;

/// 单进程通信器（rank 0, size 1）
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    #[inline]
    fn rank(&self) -> u32 {
        0
    }

    #[inline]
    fn size(&self) -> usize {
        1
    }

    fn all_gather_bytes(&self, data: &[u8]) -> CommResult<Vec<Vec<u8>>> {
        Ok(vec![data.to_vec()])
    }

    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> CommResult<Vec<Vec<u8>>> {
        if send.len() != 1 {
            return Err(CommError::InvalidArgument(format!(
                "all_to_all 需要 1 个发送缓冲区, 提供 {}",
                send.len()
            )));
        }
        Ok(send)
    }
}
