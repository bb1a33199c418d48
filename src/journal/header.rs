use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::block::{BlockSize, Page};
use crate::journal::checksum::{checksum, CHECKSUM_SIZE};
use crate::journal::slot_allocator::LogSlotAllocator;
use crate::{ErrorKind, Result};

/// ジャーナルヘッダの先頭に置かれるマジックナンバー ("JRNL").
pub const MAGIC_NUMBER: u32 = 0x4C4E_524A;

/// チェックサムを除いた、ヘッダのエンコード後のサイズ.
const HEADER_SIZE: usize =
    4 /* magic */ +
    4 /* reserved */ +
    8 /* size */ +
    8 /* log_start */ +
    8 /* log_end */ +
    8 /* log_size */ +
    8 /* log_capacity */;

/// ジャーナル領域の先頭ブロックに格納されるヘッダ.
///
/// ブロック内のレイアウト(リトルエンディアン):
///
/// ```text
/// 0..4    magic
/// 4..8    reserved (0)
/// 8..16   size
/// 16..24  log_start
/// 24..32  log_end
/// 32..40  log_size
/// 40..48  log_capacity
/// 48..56  checksum (0..48 に対するもの)
/// 56..    0-padding
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    /// ジャーナル領域全体のブロック数 (ヘッダブロックを含む).
    pub size: u64,

    /// ログスロットアロケータの先頭インデックス.
    pub log_start: u64,

    /// ログスロットアロケータの末尾インデックス.
    pub log_end: u64,

    /// 使用中のスロット数.
    pub log_size: u64,

    /// スロットの総数.
    ///
    /// 常に`size - 1`と等しい.
    pub log_capacity: u64,
}
impl JournalHeader {
    /// フォーマット直後の状態を表すヘッダを生成する.
    pub fn new(size: u64) -> Self {
        JournalHeader {
            size,
            log_start: 0,
            log_end: 0,
            log_size: 0,
            log_capacity: size.saturating_sub(1),
        }
    }

    /// サイズとアロケータの状態からヘッダを生成する.
    pub fn with_allocator(size: u64, allocator: &LogSlotAllocator) -> Self {
        JournalHeader {
            size,
            log_start: allocator.start(),
            log_end: allocator.end(),
            log_size: allocator.size(),
            log_capacity: allocator.capacity(),
        }
    }

    /// ヘッダが保持している状態を反映したアロケータを生成する.
    ///
    /// # Errors
    ///
    /// 状態が不整合な場合には、種類が`ErrorKind::DataCorrupt`のエラーが返される.
    pub fn to_allocator(&self) -> Result<LogSlotAllocator> {
        let mut allocator = track!(LogSlotAllocator::new(1))?;
        track!(allocator.reset(
            self.log_start,
            self.log_end,
            self.log_size,
            self.log_capacity
        ))?;
        Ok(allocator)
    }

    /// ヘッダをエンコードしたページを返す.
    pub fn to_page(&self, block_size: BlockSize) -> Result<Page> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + CHECKSUM_SIZE);
        track!(self.write_to(&mut buf))?;
        let digest = checksum(&buf);
        track_io!(buf.write_u64::<LittleEndian>(digest))?;
        track!(Page::from_bytes(&buf, block_size))
    }

    /// ページからヘッダをデコードする.
    ///
    /// # Errors
    ///
    /// 検証は以下の順で行われる:
    ///
    /// 1. マジックナンバーが不正: `ErrorKind::BadMagic`
    /// 2. チェックサムが不一致: `ErrorKind::DataCorrupt`
    /// 3. サイズが不正 (`size <= 1`ないし`log_capacity != size - 1`): `ErrorKind::BadSize`
    pub fn from_page(page: &Page) -> Result<Self> {
        let bytes = page.as_bytes();
        track_assert!(
            bytes.len() >= HEADER_SIZE + CHECKSUM_SIZE,
            ErrorKind::BadSize; bytes.len()
        );

        let magic = LittleEndian::read_u32(&bytes[0..4]);
        track_assert_eq!(magic, MAGIC_NUMBER, ErrorKind::BadMagic);

        let expected = LittleEndian::read_u64(&bytes[HEADER_SIZE..]);
        let actual = checksum(&bytes[..HEADER_SIZE]);
        track_assert_eq!(
            actual,
            expected,
            ErrorKind::DataCorrupt,
            "journal header checksum mismatch"
        );

        let header = track!(Self::read_from(&bytes[8..HEADER_SIZE]))?;
        track_assert!(header.size > 1, ErrorKind::BadSize; header.size);
        track_assert_eq!(
            header.log_capacity,
            header.size - 1,
            ErrorKind::BadSize; header.size
        );
        Ok(header)
    }

    fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        track_io!(writer.write_u32::<LittleEndian>(MAGIC_NUMBER))?;
        track_io!(writer.write_u32::<LittleEndian>(0))?;
        track_io!(writer.write_u64::<LittleEndian>(self.size))?;
        track_io!(writer.write_u64::<LittleEndian>(self.log_start))?;
        track_io!(writer.write_u64::<LittleEndian>(self.log_end))?;
        track_io!(writer.write_u64::<LittleEndian>(self.log_size))?;
        track_io!(writer.write_u64::<LittleEndian>(self.log_capacity))?;
        Ok(())
    }

    fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let size = track_io!(reader.read_u64::<LittleEndian>())?;
        let log_start = track_io!(reader.read_u64::<LittleEndian>())?;
        let log_end = track_io!(reader.read_u64::<LittleEndian>())?;
        let log_size = track_io!(reader.read_u64::<LittleEndian>())?;
        let log_capacity = track_io!(reader.read_u64::<LittleEndian>())?;
        Ok(JournalHeader {
            size,
            log_start,
            log_end,
            log_size,
            log_capacity,
        })
    }
}
