//! Block encoder with three effort levels.
//!
//! All levels share the emission policy in [`emit_match`]: pending literals
//! are fused into the copy tag when the format allows it, a match at the last
//! used offset becomes a repeat tag, and the output is abandoned in favour of
//! the raw form as soon as it grows past `len(src) + header - 11` bytes.
//!
//! The match-finder tables live in [`Encoder`] and are allocated on first use
//! of a level, then cleared and reused for every following block.

use super::tag::{
    can_fuse, copy_cost, emit_copy, emit_copy_lits, emit_literal, emit_repeat, repeat_cost,
};
use super::types::{
    hash4, hash8, load32, load64, match_len, BlockError, Level, BAIL_MARGIN, BLOCK_MARKER,
    COPY3_MAX_OFFSET, INPUT_MARGIN, MIN_MATCH, MIN_NON_LITERAL_BLOCK_SIZE,
};
use crate::config::MAX_BLOCK_SIZE;
use crate::varint::put_uvarint;

// ─────────────────────────────────────────────────────────────────────────────
// Table sizing
// ─────────────────────────────────────────────────────────────────────────────

/// Fastest: one 4-byte hash table, 64 Ki entries.
const FAST_TABLE_BITS: u32 = 16;
/// Balanced: 8-byte hash table, 128 Ki entries.
const LONG_TABLE_BITS: u32 = 17;
/// Balanced: 4-byte hash table, 16 Ki entries.
const SHORT_TABLE_BITS: u32 = 14;
/// Smallest: chain heads, 128 Ki entries.
const HEAD_BITS: u32 = 17;
/// Smallest: chain links, one per position inside a 2 MiB window.
const CHAIN_BITS: u32 = 21;
const CHAIN_SIZE: usize = 1 << CHAIN_BITS;
const CHAIN_MASK: usize = CHAIN_SIZE - 1;
const CHAIN_MAX_DISTANCE: usize = CHAIN_SIZE - 1;

/// Candidates examined per position by the smallest level.
const SEARCH_DEPTH: usize = 32;
/// A match this long ends the chain walk early.
const NICE_LEN: usize = 256;

/// Step growth while no match is found: one extra byte per `1 << SKIP_LOG`
/// bytes since the last emitted position.
const FAST_SKIP_LOG: u32 = 5;
const BALANCED_SKIP_LOG: u32 = 7;
const SMALLEST_SKIP_LOG: u32 = 9;

// ─────────────────────────────────────────────────────────────────────────────
// Emission
// ─────────────────────────────────────────────────────────────────────────────

/// The block cannot be stored in fewer bytes than its raw form.
struct Incompressible;

type Fit = Result<(), Incompressible>;

fn emit_literals_checked(dst: &mut Vec<u8>, lits: &[u8], limit: usize) -> Fit {
    if dst.len() + lits.len() > limit {
        return Err(Incompressible);
    }
    emit_literal(dst, lits);
    Ok(())
}

/// Emits `lits` followed by a copy of `len` bytes at `offset`.
fn emit_match(
    dst: &mut Vec<u8>,
    lits: &[u8],
    offset: usize,
    len: usize,
    repeat: usize,
    limit: usize,
) -> Fit {
    if offset == repeat {
        emit_literals_checked(dst, lits, limit)?;
        emit_repeat(dst, len);
    } else if !lits.is_empty() && can_fuse(lits.len(), offset) {
        emit_copy_lits(dst, lits, offset, len);
    } else {
        emit_literals_checked(dst, lits, limit)?;
        emit_copy(dst, offset, len);
    }
    if dst.len() > limit {
        return Err(Incompressible);
    }
    Ok(())
}

fn emit_remainder(dst: &mut Vec<u8>, lits: &[u8], limit: usize) -> Fit {
    emit_literals_checked(dst, lits, limit)
}

/// Appends the raw form of `src`: `[0]` when empty, else `[0, 0]` + `src`.
fn emit_raw(dst: &mut Vec<u8>, src: &[u8]) {
    dst.push(BLOCK_MARKER);
    if !src.is_empty() {
        dst.push(0);
        dst.extend_from_slice(src);
    }
}

#[inline]
fn is_match(src: &[u8], candidate: usize, s: usize) -> bool {
    candidate < s && s - candidate <= COPY3_MAX_OFFSET && load32(src, candidate) == load32(src, s)
}

/// Clears `table`, allocating it with `size` entries on first use.
fn reset(table: &mut Vec<u32>, size: usize) -> &mut [u32] {
    if table.len() == size {
        table.fill(0);
    } else {
        *table = vec![0; size];
    }
    table
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoder
// ─────────────────────────────────────────────────────────────────────────────

/// Reusable block encoder.  One per thread; tables are never shared.
#[derive(Default)]
pub struct Encoder {
    fast: Vec<u32>,
    long: Vec<u32>,
    short: Vec<u32>,
    head: Vec<u32>,
    chain: Vec<u32>,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("fast", &self.fast.len())
            .field("long", &self.long.len())
            .field("short", &self.short.len())
            .field("head", &self.head.len())
            .field("chain", &self.chain.len())
            .finish()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `src` into a new buffer.
    pub fn encode(&mut self, src: &[u8], level: Level) -> Result<Vec<u8>, BlockError> {
        let mut dst = Vec::with_capacity(src.len() + 2);
        self.encode_into(&mut dst, src, level)?;
        Ok(dst)
    }

    /// Appends the encoded form of `src` to `dst` and returns its length.
    ///
    /// The appended block is never longer than `max_encoded_len(src.len())`.
    pub fn encode_into(
        &mut self,
        dst: &mut Vec<u8>,
        src: &[u8],
        level: Level,
    ) -> Result<usize, BlockError> {
        if src.len() > MAX_BLOCK_SIZE {
            return Err(BlockError::TooLarge);
        }
        let start = dst.len();
        if src.len() <= MIN_NON_LITERAL_BLOCK_SIZE {
            emit_raw(dst, src);
            return Ok(dst.len() - start);
        }

        dst.reserve(src.len() + 8);
        dst.push(BLOCK_MARKER);
        put_uvarint(dst, src.len() as u64);
        let limit = dst.len() + src.len() - BAIL_MARGIN;

        let fit = match level {
            Level::Fastest => self.encode_fastest(dst, src, limit),
            Level::Balanced => self.encode_balanced(dst, src, limit),
            Level::Smallest => self.encode_smallest(dst, src, limit),
        };
        if fit.is_err() || dst.len() > limit {
            dst.truncate(start);
            emit_raw(dst, src);
        }
        Ok(dst.len() - start)
    }

    /// Greedy single-table search with a repeat-offset check.
    fn encode_fastest(&mut self, dst: &mut Vec<u8>, src: &[u8], limit: usize) -> Fit {
        let table = reset(&mut self.fast, 1 << FAST_TABLE_BITS);
        let s_limit = src.len() - INPUT_MARGIN;
        let mut next_emit = 0usize;
        let mut s = 1usize;
        let mut repeat = 1usize;

        'search: loop {
            let mut candidate;
            loop {
                if s > s_limit {
                    break 'search;
                }
                let cv = load32(src, s);
                if repeat <= s && load32(src, s - repeat) == cv {
                    candidate = s - repeat;
                    break;
                }
                let h = hash4(cv, FAST_TABLE_BITS);
                candidate = table[h] as usize;
                table[h] = s as u32;
                if is_match(src, candidate, s) {
                    break;
                }
                s += 1 + ((s - next_emit) >> FAST_SKIP_LOG);
            }

            let base = s;
            let offset = s - candidate;
            s += MIN_MATCH + match_len(src, candidate + MIN_MATCH, s + MIN_MATCH);
            emit_match(dst, &src[next_emit..base], offset, s - base, repeat, limit)?;
            repeat = offset;
            next_emit = s;
            if s > s_limit {
                break;
            }
            for i in [base + 1, s - 2, s - 1] {
                table[hash4(load32(src, i), FAST_TABLE_BITS)] = i as u32;
            }
        }
        emit_remainder(dst, &src[next_emit..], limit)
    }

    /// Long and short tables, repeat check, `s + 1` check and backward
    /// extension.
    fn encode_balanced(&mut self, dst: &mut Vec<u8>, src: &[u8], limit: usize) -> Fit {
        let long = reset(&mut self.long, 1 << LONG_TABLE_BITS);
        let short = reset(&mut self.short, 1 << SHORT_TABLE_BITS);
        let s_limit = src.len() - 8;
        let mut next_emit = 0usize;
        let mut s = 1usize;
        let mut repeat = 1usize;

        'search: loop {
            let mut candidate;
            loop {
                if s > s_limit {
                    break 'search;
                }
                let cv = load64(src, s);
                let hl = hash8(cv, LONG_TABLE_BITS);
                let hs = hash4(cv as u32, SHORT_TABLE_BITS);
                let cand_long = long[hl] as usize;
                let cand_short = short[hs] as usize;
                long[hl] = s as u32;
                short[hs] = s as u32;

                if repeat <= s && load32(src, s - repeat) == cv as u32 {
                    candidate = s - repeat;
                    break;
                }
                if is_match(src, cand_long, s) {
                    candidate = cand_long;
                    break;
                }
                if is_match(src, cand_short, s) {
                    candidate = cand_short;
                    let next = s + 1;
                    if next <= s_limit {
                        let h1 = hash8(load64(src, next), LONG_TABLE_BITS);
                        let cand_next = long[h1] as usize;
                        long[h1] = next as u32;
                        if is_match(src, cand_next, next)
                            && match_len(src, cand_next, next) > match_len(src, cand_short, s)
                        {
                            candidate = cand_next;
                            s = next;
                        }
                    }
                    break;
                }
                s += 1 + ((s - next_emit) >> BALANCED_SKIP_LOG);
            }

            while candidate > 0 && s > next_emit && src[candidate - 1] == src[s - 1] {
                candidate -= 1;
                s -= 1;
            }

            let base = s;
            let offset = s - candidate;
            s += match_len(src, candidate, s);
            emit_match(dst, &src[next_emit..base], offset, s - base, repeat, limit)?;
            repeat = offset;
            next_emit = s;
            if s > s_limit {
                break;
            }
            for i in [base + 1, base + 2, s - 2, s - 1] {
                let cv = load64(src, i);
                long[hash8(cv, LONG_TABLE_BITS)] = i as u32;
                short[hash4(cv as u32, SHORT_TABLE_BITS)] = i as u32;
            }
        }
        emit_remainder(dst, &src[next_emit..], limit)
    }

    /// Hash-chain search, cost-based selection, one step of lazy matching.
    fn encode_smallest(&mut self, dst: &mut Vec<u8>, src: &[u8], limit: usize) -> Fit {
        let Encoder { head, chain, .. } = self;
        if chain.len() != CHAIN_SIZE {
            *chain = vec![0; CHAIN_SIZE];
        }
        let mut finder = ChainFinder {
            src,
            head: reset(head, 1 << HEAD_BITS),
            chain,
            indexed: 0,
            s_limit: src.len() - INPUT_MARGIN,
        };
        let s_limit = finder.s_limit;
        let mut next_emit = 0usize;
        let mut s = 1usize;
        let mut repeat = 1usize;

        while s <= s_limit {
            let Some(mut m) = finder.best(s, repeat) else {
                s += 1 + ((s - next_emit) >> SMALLEST_SKIP_LOG);
                continue;
            };
            if s < s_limit {
                if let Some(next) = finder.best(s + 1, repeat) {
                    if next.score > m.score + 1 {
                        m = next;
                        s += 1;
                    }
                }
            }
            let base = s;
            s += m.len;
            emit_match(dst, &src[next_emit..base], m.offset, m.len, repeat, limit)?;
            repeat = m.offset;
            next_emit = s;
            finder.insert_until(s);
        }
        emit_remainder(dst, &src[next_emit..], limit)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hash-chain match finder (smallest level)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Match {
    offset: usize,
    len: usize,
    /// Bytes saved over emitting the match as literals.
    score: isize,
}

struct ChainFinder<'a> {
    src: &'a [u8],
    /// Position + 1 of the newest entry per hash, 0 when empty.
    head: &'a mut [u32],
    /// Position + 1 of the previous entry with the same hash.
    chain: &'a mut [u32],
    /// Positions below this have been inserted.
    indexed: usize,
    s_limit: usize,
}

impl ChainFinder<'_> {
    fn insert_until(&mut self, end: usize) {
        let end = end.min(self.s_limit + 1);
        while self.indexed < end {
            let p = self.indexed;
            let h = hash4(load32(self.src, p), HEAD_BITS);
            self.chain[p & CHAIN_MASK] = self.head[h];
            self.head[h] = (p + 1) as u32;
            self.indexed += 1;
        }
    }

    /// Best-scoring match at `s` among the repeat offset and the chain.
    fn best(&mut self, s: usize, repeat: usize) -> Option<Match> {
        self.insert_until(s);
        let src = self.src;
        let mut best: Option<Match> = None;
        let mut consider = |offset: usize, len: usize, cost: usize| {
            let score = len as isize - cost as isize;
            if best.map_or(true, |b| score > b.score) {
                best = Some(Match { offset, len, score });
            }
        };

        if repeat <= s {
            let len = match_len(src, s - repeat, s);
            if len >= MIN_MATCH {
                consider(repeat, len, repeat_cost(len));
            }
        }

        let mut entry = self.head[hash4(load32(src, s), HEAD_BITS)] as usize;
        let mut depth = SEARCH_DEPTH;
        while entry != 0 && depth > 0 {
            let c = entry - 1;
            if c >= s || s - c > CHAIN_MAX_DISTANCE.min(COPY3_MAX_OFFSET) {
                break;
            }
            let len = match_len(src, c, s);
            if len >= MIN_MATCH {
                consider(s - c, len, copy_cost(s - c, len));
                if len >= NICE_LEN {
                    break;
                }
            }
            let next = self.chain[c & CHAIN_MASK] as usize;
            if next == 0 || next > c {
                break;
            }
            entry = next;
            depth -= 1;
        }
        best
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Free functions
// ─────────────────────────────────────────────────────────────────────────────

/// Encodes `src` with a fresh [`Encoder`].
pub fn encode(src: &[u8], level: Level) -> Result<Vec<u8>, BlockError> {
    Encoder::new().encode(src, level)
}
