use std::collections::HashSet;

use crate::{ErrorKind, Result};

/// ジャーナルのログ領域のスロット群を、循環的に割り当てるためのアロケータ.
///
/// スロットは`[0, capacity)`の範囲のインデックスで識別され、
/// 末尾(`end`)から割り当てられ、先頭(`start`)からのみ解放される.
///
/// 不変項: `size == (end - start) mod capacity` (ただし満杯時は`size == capacity`かつ`start == end`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSlotAllocator {
    start: u64,
    end: u64,
    size: u64,
    capacity: u64,
}
impl LogSlotAllocator {
    /// 空の`LogSlotAllocator`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `capacity`が`0`の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn new(capacity: u64) -> Result<Self> {
        track_assert!(capacity >= 1, ErrorKind::InvalidInput);
        Ok(LogSlotAllocator {
            start: 0,
            end: 0,
            size: 0,
            capacity,
        })
    }

    /// 永続化されていた状態を復元する.
    ///
    /// # Errors
    ///
    /// 与えられた値同士が整合していない場合には、
    /// 種類が`ErrorKind::DataCorrupt`のエラーが返され、状態は変更されない.
    pub fn reset(&mut self, start: u64, end: u64, size: u64, capacity: u64) -> Result<()> {
        track_assert!(capacity >= 1, ErrorKind::DataCorrupt; capacity);
        track_assert!(start < capacity, ErrorKind::DataCorrupt; start, capacity);
        track_assert!(end < capacity, ErrorKind::DataCorrupt; end, capacity);
        track_assert!(size <= capacity, ErrorKind::DataCorrupt; size, capacity);
        if size == capacity {
            track_assert_eq!(start, end, ErrorKind::DataCorrupt);
        } else {
            let distance = (end + capacity - start) % capacity;
            track_assert_eq!(distance, size, ErrorKind::DataCorrupt; start, end, capacity);
        }
        *self = LogSlotAllocator {
            start,
            end,
            size,
            capacity,
        };
        Ok(())
    }

    /// 次のスロットを割り当てて、そのインデックスを返す.
    ///
    /// # Errors
    ///
    /// 空きスロットが存在しない場合には、種類が`ErrorKind::Exhausted`のエラーが返される.
    pub fn allocate(&mut self) -> Result<u64> {
        track_assert!(
            self.size < self.capacity,
            ErrorKind::Exhausted,
            "no free log slot: capacity={}",
            self.capacity
        );
        let index = self.end;
        self.end = (self.end + 1) % self.capacity;
        self.size += 1;
        Ok(index)
    }

    /// 先頭のスロットを解放する.
    ///
    /// `index`は現在の先頭(`start`)と一致している必要がある.
    ///
    /// # Errors
    ///
    /// - 使用中のスロットが存在しない場合には、種類が`ErrorKind::NotFound`のエラーが返される
    /// - `index`が先頭ではない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される
    pub fn reclaim(&mut self, index: u64) -> Result<()> {
        track_assert_ne!(self.size, 0, ErrorKind::NotFound);
        track_assert_eq!(index, self.start, ErrorKind::InvalidInput);
        self.start = (self.start + 1) % self.capacity;
        self.size -= 1;
        Ok(())
    }

    /// `indices`に含まれるスロット群を、先頭から解放可能な分だけ解放する.
    ///
    /// 先頭のスロットが`indices`に含まれている限り、解放と`indices`からの除去を繰り返す.
    /// 先頭に到達していないスロットは`indices`に残されるので、後続の呼び出しで解放される.
    ///
    /// 結果として、解放したスロットの数を返す.
    pub fn reclaim_set(&mut self, indices: &mut HashSet<u64>) -> u64 {
        let mut reclaimed = 0;
        while self.size != 0 && indices.remove(&self.start) {
            self.start = (self.start + 1) % self.capacity;
            self.size -= 1;
            reclaimed += 1;
        }
        reclaimed
    }

    /// 末尾から`count`個のスロットの割り当てを取り消す.
    ///
    /// # Errors
    ///
    /// `count`が使用中のスロット数を超えている場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn rewind(&mut self, count: u64) -> Result<()> {
        track_assert!(count <= self.size, ErrorKind::InvalidInput; count, self.size);
        self.end = (self.end + self.capacity - count % self.capacity) % self.capacity;
        self.size -= count;
        Ok(())
    }

    /// 使用中のスロットのインデックス群を、先頭から順に返す.
    pub fn in_use(&self) -> InUseSlots {
        InUseSlots {
            next: self.start,
            remaining: self.size,
            capacity: self.capacity,
        }
    }

    /// 先頭(最も古い使用中スロット)のインデックス.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// 次に割り当てられるスロットのインデックス.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// 使用中のスロット数.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// スロットの総数.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// 使用中のスロットが存在しないかどうか.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// 全てのスロットが使用中かどうか.
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }
}

impl Default for LogSlotAllocator {
    /// 容量が`1`の空のアロケータを返す.
    fn default() -> Self {
        LogSlotAllocator {
            start: 0,
            end: 0,
            size: 0,
            capacity: 1,
        }
    }
}

/// 使用中スロットのイテレータ.
#[derive(Debug)]
pub struct InUseSlots {
    next: u64,
    remaining: u64,
    capacity: u64,
}
impl Iterator for InUseSlots {
    type Item = u64;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next;
        self.next = (self.next + 1) % self.capacity;
        self.remaining -= 1;
        Some(index)
    }
}
