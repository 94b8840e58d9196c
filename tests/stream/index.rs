// Seek index as produced by the writer.
//
//   - one entry per block, pointing at the block's chunk header
//   - the tail lookup and the chunk walk agree
//   - thinning of small-block streams keeps seeking exact

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use minlz::stream::types::{ChunkHeader, CHUNK_MINLZ_BLOCK, CHUNK_UNCOMPRESSED};
use minlz::stream::IndexEntry;
use minlz::{compress, Index, Reader, Writer, WriterOptions};

fn words(n: usize) -> Vec<u8> {
    let mut x = 99u32;
    let mut out = Vec::with_capacity(n + 16);
    while out.len() < n {
        x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        out.extend_from_slice(["alpha ", "beta ", "gamma ", "delta ", "epsilon "][(x >> 29) as usize % 5].as_bytes());
    }
    out.truncate(n);
    out
}

#[test]
fn one_entry_per_block() {
    let src = words(100_000);
    let z = compress(&src, &WriterOptions::default().with_block_size(8192)).unwrap();
    let idx = Index::from_tail(&z).unwrap().unwrap();

    assert_eq!(idx.len(), (100_000 + 8191) / 8192);
    assert_eq!(idx.total_uncompressed, 100_000);
    assert_eq!(idx.est_block_uncompressed(), 8192);
    for (i, e) in idx.entries.iter().enumerate() {
        assert_eq!(e.uncompressed_offset, i as i64 * 8192);
        let h = ChunkHeader::read(&z[e.compressed_offset as usize..]).unwrap();
        assert!(h.chunk_type == CHUNK_MINLZ_BLOCK || h.chunk_type == CHUNK_UNCOMPRESSED);
    }
    assert_eq!(idx.entries[0].compressed_offset, 10);
}

#[test]
fn tail_and_walk_agree() {
    let z = compress(&words(50_000), &WriterOptions::default().with_block_size(4096)).unwrap();
    let tail = Index::from_tail(&z).unwrap().unwrap();
    let walked = Index::from_stream(&z).unwrap().unwrap();
    assert_eq!(tail, walked);
    let read = Index::from_reader(&mut Cursor::new(&z)).unwrap().unwrap();
    assert_eq!(tail, read);
}

#[test]
fn total_compressed_points_at_index() {
    let z = compress(&words(20_000), &WriterOptions::default()).unwrap();
    let idx = Index::from_tail(&z).unwrap().unwrap();
    let at = idx.total_compressed as usize;
    assert_eq!(Index::load(&z[at..]).unwrap(), idx);

    let padded = compress(&words(20_000), &WriterOptions::default().with_padding(4096)).unwrap();
    assert_eq!(padded.len() % 4096, 0);
    let idx = Index::from_tail(&padded).unwrap().unwrap();
    let at = idx.total_compressed as usize;
    assert_eq!(Index::load(&padded[at..]).unwrap(), idx);
    let read = Index::from_reader(&mut Cursor::new(&padded)).unwrap().unwrap();
    assert_eq!(read, idx);
}

#[test]
fn find_maps_every_entry() {
    let z = compress(&words(70_000), &WriterOptions::default().with_block_size(4096)).unwrap();
    let idx = Index::from_tail(&z).unwrap().unwrap();
    for e in &idx.entries {
        let want = (e.compressed_offset, e.uncompressed_offset);
        assert_eq!(idx.find(e.uncompressed_offset).unwrap(), want);
        assert_eq!(idx.find(e.uncompressed_offset + 4095i64.min(69_999 - e.uncompressed_offset)).unwrap(), want);
    }
    assert!(idx.find(70_001).is_err());
    assert_eq!(idx.find(-1).unwrap(), idx.find(69_999).unwrap());
}

#[test]
fn small_blocks_are_thinned() {
    let src = words(3 << 20);
    let opts = WriterOptions::default().with_block_size(1024);
    let z = compress(&src, &opts).unwrap();
    let idx = Index::from_tail(&z).unwrap().unwrap();

    // 3072 blocks kept one in four.
    assert_eq!(idx.len(), 768);
    assert_eq!(idx.est_block_uncompressed(), 4096);

    let mut r = Reader::new(Cursor::new(&z));
    let mut buf = [0u8; 64];
    for &at in &[0u64, 1, 4095, 4096, 1_000_003, (3 << 20) - 64] {
        r.seek(SeekFrom::Start(at)).unwrap();
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &src[at as usize..at as usize + 64], "at {}", at);
    }
}

#[test]
fn uneven_blocks_after_flush() {
    let opts = WriterOptions::default().with_block_size(4096);
    let mut w = Writer::with_options(Vec::new(), opts).unwrap();
    let src = words(10_000);
    w.write_all(&src[..100]).unwrap();
    w.flush().unwrap();
    w.write_all(&src[100..]).unwrap();
    let z = w.into_inner().unwrap();

    let idx = Index::from_tail(&z).unwrap().unwrap();
    let starts: Vec<i64> = idx.entries.iter().map(|e: &IndexEntry| e.uncompressed_offset).collect();
    assert_eq!(starts, [0, 100, 4196, 8292]);

    let mut r = Reader::new(Cursor::new(&z));
    r.seek(SeekFrom::Start(4200)).unwrap();
    let mut rest = Vec::new();
    r.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, &src[4200..]);
}

#[test]
fn streams_without_index() {
    let z = compress(&words(5000), &WriterOptions::default().with_index(false)).unwrap();
    assert!(Index::from_tail(&z).unwrap().is_none());
    assert!(Index::from_stream(&z).unwrap().is_none());
    assert!(Index::from_reader(&mut Cursor::new(&z)).unwrap().is_none());
}
