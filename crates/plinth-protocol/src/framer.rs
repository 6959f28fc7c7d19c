//! 行分帧器
//!
//! 把任意大小的文本块切成以 `\n`（或 `\r\n`）结尾的行。
//!
//! - 最后一个不完整的片段作为残余保留到下一次 [`LineFramer::push`]
//! - 去除首尾空白后为空的行静默丢弃
//! - [`LineFramer::push`] 返回惰性迭代器；迭代器被提前丢弃时，
//!   未取走的行会在下一次 `push` 时继续产出
//! - 只能通过 [`LineFramer::reset`] 丢弃缓冲区重新开始（重连时调用）

/// 默认的单行长度上限（字节）
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// 一行设备输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 去除首尾空白后的文本（非空）
    pub text: String,
    /// 分帧器内单调递增的序号
    pub seq: u64,
    /// 该行第一个字节到达时所在块的时间戳（微秒）
    pub timestamp_us: u64,
}

/// 行分帧器
#[derive(Debug)]
pub struct LineFramer {
    buffer: String,
    /// 已产出部分的末尾（`buffer[..cursor]` 等待压缩）
    cursor: usize,
    /// 残余片段首字节所在块的时间戳
    carry_since_us: Option<u64>,
    next_seq: u64,
    max_line_len: usize,
    overflowed: u64,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// 指定单行上限
    ///
    /// 残余片段超过上限仍未见到换行时整段丢弃（计入 [`Self::overflow_count`]），
    /// 防止设备持续输出无换行数据时缓冲区无限增长。
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: String::with_capacity(1024),
            cursor: 0,
            carry_since_us: None,
            next_seq: 0,
            max_line_len: max_line_len.max(1),
            overflowed: 0,
        }
    }

    /// 追加一块文本，返回本次可得的完整行
    pub fn push(&mut self, chunk: &str, timestamp_us: u64) -> Frames<'_> {
        if self.cursor == self.buffer.len() {
            self.buffer.clear();
            self.cursor = 0;
        }
        if self.buffer.is_empty() {
            self.carry_since_us = None;
        }
        self.buffer.push_str(chunk);
        Frames {
            framer: self,
            timestamp_us,
        }
    }

    /// 当前残余片段（尚未见到换行的部分）
    pub fn pending(&self) -> &str {
        &self.buffer[self.cursor..]
    }

    /// 因超长被丢弃的片段数
    pub fn overflow_count(&self) -> u64 {
        self.overflowed
    }

    /// 丢弃缓冲区，重新开始
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.carry_since_us = None;
    }

    fn compact(&mut self, timestamp_us: u64) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        if self.buffer.len() > self.max_line_len {
            self.buffer.clear();
            self.carry_since_us = None;
            self.overflowed += 1;
            return;
        }
        if !self.buffer.is_empty() && self.carry_since_us.is_none() {
            self.carry_since_us = Some(timestamp_us);
        }
    }
}

/// [`LineFramer::push`] 返回的惰性行迭代器
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut LineFramer,
    timestamp_us: u64,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            let start = self.framer.cursor;
            let Some(offset) = self.framer.buffer[start..].find('\n') else {
                self.framer.compact(self.timestamp_us);
                return None;
            };
            let end = start + offset;

            let line = &self.framer.buffer[start..end];
            let line = line.strip_suffix('\r').unwrap_or(line);
            let text = line.trim().to_string();

            self.framer.cursor = end + 1;
            let started = self.framer.carry_since_us.take().unwrap_or(self.timestamp_us);

            if text.is_empty() {
                continue;
            }

            let seq = self.framer.next_seq;
            self.framer.next_seq += 1;
            return Some(Frame {
                text,
                seq,
                timestamp_us: started,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(framer: &mut LineFramer, chunk: &str) -> Vec<String> {
        framer.push(chunk, 0).map(|f| f.text).collect()
    }

    #[test]
    fn test_lines_simple() {
        let mut framer = LineFramer::new();
        assert_eq!(texts(&mut framer, "12,34\nready\n"), vec!["12,34", "ready"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut framer = LineFramer::new();
        assert_eq!(
            texts(&mut framer, "a\r\n\r\n   \nb\r\n"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_partial_line_is_carried() {
        let mut framer = LineFramer::new();
        assert!(texts(&mut framer, "12,3").is_empty());
        assert_eq!(framer.pending(), "12,3");
        assert_eq!(texts(&mut framer, "4\r"), Vec::<String>::new());
        assert_eq!(texts(&mut framer, "\nnext"), vec!["12,34"]);
        assert_eq!(framer.pending(), "next");
    }

    #[test]
    fn test_line_timestamp_is_first_chunk() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push("hel", 100).count(), 0);
        let frames: Vec<_> = framer.push("lo\nworld\n", 200).collect();
        assert_eq!(frames[0].timestamp_us, 100);
        assert_eq!(frames[1].timestamp_us, 200);
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut framer = LineFramer::new();
        let a: Vec<_> = framer.push("a\nb\n", 0).collect();
        let b: Vec<_> = framer.push("c\n", 0).collect();
        assert_eq!(a[0].seq, 0);
        assert_eq!(a[1].seq, 1);
        assert_eq!(b[0].seq, 2);
    }

    #[test]
    fn test_unconsumed_frames_survive_dropped_iterator() {
        let mut framer = LineFramer::new();
        {
            let mut frames = framer.push("one\ntwo\nthree\n", 0);
            assert_eq!(frames.next().map(|f| f.text).as_deref(), Some("one"));
        }
        assert_eq!(texts(&mut framer, ""), vec!["two", "three"]);
    }

    #[test]
    fn test_reset_discards_carry() {
        let mut framer = LineFramer::new();
        assert!(texts(&mut framer, "garbage without newline").is_empty());
        framer.reset();
        assert_eq!(texts(&mut framer, "ok\n"), vec!["ok"]);
    }

    #[test]
    fn test_overlong_fragment_is_dropped() {
        let mut framer = LineFramer::with_max_line_len(8);
        assert!(texts(&mut framer, "0123456789").is_empty());
        assert_eq!(framer.overflow_count(), 1);
        assert_eq!(framer.pending(), "");
        assert_eq!(texts(&mut framer, "tail\nok\n"), vec!["tail", "ok"]);
    }

    fn split_at_points(input: &str, points: &[usize]) -> Vec<String> {
        let chars: Vec<char> = input.chars().collect();
        let mut cuts: Vec<usize> = points.iter().map(|p| p % (chars.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();
        let mut chunks = Vec::new();
        let mut last = 0;
        for cut in cuts.into_iter().chain(std::iter::once(chars.len())) {
            chunks.push(chars[last..cut].iter().collect());
            last = cut;
        }
        chunks
    }

    proptest! {
        #[test]
        fn prop_chunking_invariance(
            lines in prop::collection::vec("[ a-z0-9,.\\-\r]{0,12}", 0..12),
            points in prop::collection::vec(0usize..200, 0..10),
        ) {
            let input: String = lines.iter().map(|l| format!("{l}\n")).collect();

            let mut whole = LineFramer::new();
            let expected: Vec<String> = whole.push(&input, 0).map(|f| f.text).collect();

            let mut chunked = LineFramer::new();
            let mut actual = Vec::new();
            for chunk in split_at_points(&input, &points) {
                actual.extend(chunked.push(&chunk, 0).map(|f| f.text));
            }

            prop_assert_eq!(actual, expected);
            prop_assert_eq!(chunked.pending(), "");
        }

        #[test]
        fn prop_decoder_and_framer_byte_chunking_invariance(
            lines in prop::collection::vec("[a-z0-9 ,温度]{0,8}", 0..8),
            points in prop::collection::vec(0usize..200, 0..10),
        ) {
            let input: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
            let bytes = input.as_bytes();

            let mut whole = LineFramer::new();
            let expected: Vec<String> = whole.push(&input, 0).map(|f| f.text).collect();

            let mut cuts: Vec<usize> = points.iter().map(|p| p % (bytes.len() + 1)).collect();
            cuts.sort_unstable();
            cuts.dedup();

            let mut decoder = crate::Utf8Decoder::new();
            let mut framer = LineFramer::new();
            let mut actual = Vec::new();
            let mut last = 0;
            for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
                let text = decoder.decode(&bytes[last..cut]);
                actual.extend(framer.push(&text, 0).map(|f| f.text));
                last = cut;
            }

            prop_assert_eq!(actual, expected);
            prop_assert!(!decoder.has_pending());
        }
    }
}
