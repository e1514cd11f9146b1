// crates/ms_comm/src/traits.rs

//! 通信协作者接口
//!
//! 搜索引擎只需要三种集合操作：
//!
//! - `all_gather`: 每个进程贡献一个缓冲区，所有进程得到全部缓冲区
//! - `all_to_all`: 每个进程给每个进程发送一个（可变长）缓冲区
//! - `barrier`: 同步点
//!
//! 所有进程必须以相同顺序调用集合操作。字节缓冲区之上提供 Pod 记录的
//! 类型化封装（[`CommExt`]），记录布局由 `bytemuck` 保证。

use bytemuck::Pod;

use crate::error::{CommError, CommResult};

/// 进程组通信接口
pub trait Communicator {
    /// 本进程编号
    fn rank(&self) -> u32;

    /// 进程总数
    fn size(&self) -> usize;

    /// 全收集：返回按进程编号排列的全部缓冲区
    fn all_gather_bytes(&self, data: &[u8]) -> CommResult<Vec<Vec<u8>>>;

    /// 全交换：`send[r]` 发往进程 r，返回 `recv[r]` 为来自进程 r 的缓冲区
    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> CommResult<Vec<Vec<u8>>>;

    /// 同步屏障
    fn barrier(&self) -> CommResult<()> {
        self.all_gather_bytes(&[]).map(|_| ())
    }
}

/// Pod 记录的类型化集合操作
pub trait CommExt: Communicator {
    /// 全收集单个定长记录
    fn all_gather_pod<T: Pod>(&self, value: &T) -> CommResult<Vec<T>> {
        let gathered = self.all_gather_bytes(bytemuck::bytes_of(value))?;
        gathered
            .iter()
            .enumerate()
            .map(|(peer, bytes)| {
                let mut records = decode_records::<T>(peer as u32, bytes)?;
                match (records.len(), records.pop()) {
                    (1, Some(v)) => Ok(v),
                    (n, _) => Err(CommError::malformed(peer as u32, format!("期望 1 条记录, 收到 {}", n))),
                }
            })
            .collect()
    }

    /// 全交换定长记录批次
    fn all_to_all_pod<T: Pod>(&self, send: Vec<Vec<T>>) -> CommResult<Vec<Vec<T>>> {
        let bytes: Vec<Vec<u8>> = send
            .iter()
            .map(|batch| bytemuck::cast_slice::<T, u8>(batch).to_vec())
            .collect();
        let received = self.all_to_all_bytes(bytes)?;
        received
            .iter()
            .enumerate()
            .map(|(peer, b)| decode_records::<T>(peer as u32, b))
            .collect()
    }
}

impl<C: Communicator + ?Sized> CommExt for C {}

/// 把字节缓冲区解码为记录（不要求对齐）
pub fn decode_records<T: Pod>(peer: u32, bytes: &[u8]) -> CommResult<Vec<T>> {
    let size = std::mem::size_of::<T>();
    if size == 0 || bytes.len() % size != 0 {
        return Err(CommError::malformed(
            peer,
            format!("缓冲区长度 {} 不是记录长度 {} 的整数倍", bytes.len(), size),
        ));
    }
    Ok(bytemuck::pod_collect_to_vec::<u8, T>(bytes))
}
