// crates/ms_comm/src/thread.rs

//! 进程内多线程通信器
//!
//! 每个"进程"是一个线程，线程之间只通过 `std::sync::mpsc` 通道传递消息，
//! 不共享任何搜索状态。用于单机上的分布式测试和命令行 `--ranks N`。
//!
//! # 消息协议
//!
//! 每次集合操作分配一个递增序号。消息以 `Envelope { from, seq, payload }` 发送；
//! 接收时先查暂存区，再从通道读取，序号不匹配（对端已进入下一次集合操作）
//! 的消息放入暂存区。等待超过超时时间返回 [`CommError::Timeout`]。
//!
//! # 使用示例
//!
//! ```rust
//! use ms_comm::{CommExt, Communicator, ThreadComm};
//!
//! let sums = ThreadComm::run(3, |comm| {
//!     let all = comm.all_gather_pod(&(comm.rank() as u64)).unwrap();
//!     all.iter().sum::<u64>()
//! });
//! assert_eq!(sums, vec![3, 3, 3]);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{CommError, CommResult};
use crate::traits::Communicator;

/// 默认接收超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Envelope {
    from: u32,
    seq: u64,
    payload: Vec<u8>,
}

/// 进程内通信器（每个线程一个）
#[derive(Debug)]
pub struct ThreadComm {
    rank: u32,
    size: usize,
    senders: Vec<Sender<Envelope>>,
    receiver: Receiver<Envelope>,
    stash: Mutex<Vec<Envelope>>,
    seq: AtomicU64,
    timeout: Duration,
}

/// 线程通信器构建器
#[derive(Debug, Clone)]
pub struct ThreadCommBuilder {
    size: usize,
    timeout: Duration,
}

impl ThreadCommBuilder {
    /// 创建构建器
    pub fn new(size: usize) -> Self {
        Self {
            size,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// 设置接收超时
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 创建全部通信器，下标即进程编号
    pub fn build(self) -> CommResult<Vec<ThreadComm>> {
        if self.size == 0 {
            return Err(CommError::InvalidArgument("进程数必须大于 0".into()));
        }
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..self.size).map(|_| channel()).unzip();
        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadComm {
                rank: rank as u32,
                size: self.size,
                senders: senders.clone(),
                receiver,
                stash: Mutex::new(Vec::new()),
                seq: AtomicU64::new(0),
                timeout: self.timeout,
            })
            .collect())
    }
}

impl ThreadComm {
    /// 创建构建器
    pub fn builder(size: usize) -> ThreadCommBuilder {
        ThreadCommBuilder::new(size)
    }

    /// 使用默认超时创建 `size` 个通信器
    pub fn create(size: usize) -> CommResult<Vec<ThreadComm>> {
        ThreadCommBuilder::new(size).build()
    }

    /// 在 `size` 个作用域线程上运行 `f`，按进程编号返回结果
    ///
    /// 任一线程 panic 时在调用线程重新抛出。`size` 为 0 时返回空结果。
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        match Self::create(size) {
            Ok(comms) => Self::run_with(comms, f),
            Err(_) => Vec::new(),
        }
    }

    /// 在给定通信器上各起一个作用域线程运行 `f`
    pub fn run_with<F, R>(comms: Vec<ThreadComm>, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let f = &f;
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let name = format!("rank-{}", comm.rank);
                    std::thread::Builder::new()
                        .name(name)
                        .spawn_scoped(s, move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h {
                    Ok(handle) => handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
                    Err(e) => std::panic::panic_any(format!("无法创建进程线程: {}", e)),
                })
                .collect()
        })
    }

    /// 接收超时
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, peer: usize, seq: u64, payload: Vec<u8>) -> CommResult<()> {
        self.senders[peer]
            .send(Envelope {
                from: self.rank,
                seq,
                payload,
            })
            .map_err(|_| CommError::Disconnected {
                rank: self.rank,
                peer: peer as u32,
            })
    }

    /// 收齐本次集合操作中来自所有其他进程的消息
    fn collect(&self, seq: u64, mut slots: Vec<Option<Vec<u8>>>) -> CommResult<Vec<Vec<u8>>> {
        let mut missing = slots.iter().filter(|s| s.is_none()).count();

        {
            let mut stash = self.stash.lock();
            let mut i = 0;
            while i < stash.len() && missing > 0 {
                if stash[i].seq == seq {
                    let env = stash.swap_remove(i);
                    slots[env.from as usize] = Some(env.payload);
                    missing -= 1;
                } else {
                    i += 1;
                }
            }
        }

        let start = Instant::now();
        while missing > 0 {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            match self.receiver.recv_timeout(remaining) {
                Ok(env) if env.seq == seq => {
                    let from = env.from as usize;
                    if slots[from].is_some() {
                        return Err(CommError::malformed(env.from, format!("集合操作 {} 收到重复消息", seq)));
                    }
                    slots[from] = Some(env.payload);
                    missing -= 1;
                }
                Ok(env) => {
                    tracing::trace!(rank = self.rank, from = env.from, seq = env.seq, "暂存乱序消息");
                    self.stash.lock().push(env);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let peer = slots.iter().position(|s| s.is_none()).unwrap_or(0) as u32;
                    return Err(CommError::Timeout {
                        rank: self.rank,
                        peer,
                        seq,
                        waited: start.elapsed(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let peer = slots.iter().position(|s| s.is_none()).unwrap_or(0) as u32;
                    return Err(CommError::Disconnected { rank: self.rank, peer });
                }
            }
        }
        Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
    }
}

impl Communicator for ThreadComm {
    #[inline]
    fn rank(&self) -> u32 {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn all_gather_bytes(&self, data: &[u8]) -> CommResult<Vec<Vec<u8>>> {
        let seq = self.next_seq();
        let me = self.rank as usize;
        for peer in (0..self.size).filter(|&p| p != me) {
            self.send(peer, seq, data.to_vec())?;
        }
        let mut slots = vec![None; self.size];
        slots[me] = Some(data.to_vec());
        self.collect(seq, slots)
    }

    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> CommResult<Vec<Vec<u8>>> {
        if send.len() != self.size {
            return Err(CommError::InvalidArgument(format!(
                "all_to_all 需要 {} 个发送缓冲区, 提供 {}",
                self.size,
                send.len()
            )));
        }
        let seq = self.next_seq();
        let me = self.rank as usize;
        let mut slots = vec![None; self.size];
        for (peer, payload) in send.into_iter().enumerate() {
            if peer == me {
                slots[me] = Some(payload);
            } else {
                self.send(peer, seq, payload)?;
            }
        }
        self.collect(seq, slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CommExt;

    #[test]
    fn test_all_to_all_routing() {
        let results = ThreadComm::run(4, |comm| {
            let me = comm.rank() as u64;
            let send: Vec<Vec<u64>> = (0..comm.size() as u64).map(|to| vec![me * 10 + to]).collect();
            comm.all_to_all_pod(send).unwrap()
        });
        for (r, recv) in results.iter().enumerate() {
            for (from, batch) in recv.iter().enumerate() {
                assert_eq!(batch, &vec![from as u64 * 10 + r as u64]);
            }
        }
    }

    #[test]
    fn test_single_rank() {
        let out = ThreadComm::run(1, |comm| comm.all_gather_bytes(b"x").unwrap());
        assert_eq!(out, vec![vec![b"x".to_vec()]]);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(ThreadComm::create(0).is_err());
        assert!(ThreadComm::run(0, |_| ()).is_empty());
    }
}
