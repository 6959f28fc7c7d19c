//! 流式 UTF-8 解码
//!
//! 传输层按任意边界切块，多字节字符可能被拆到两次读取中。
//! [`Utf8Decoder`] 把不完整的尾部字节留到下一块，非法字节替换为 U+FFFD。

/// 跨块 UTF-8 解码器
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解码一块字节，返回本块可确定的文本
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    input = &[];
                    break;
                },
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        },
                        // 尾部是不完整序列，留到下一块
                        None => {
                            input = rest;
                            break;
                        },
                    }
                },
            }
        }

        self.pending = input.to_vec();
        out
    }

    /// 流结束：残留的不完整序列按非法字节处理
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// 是否有等待后续字节的不完整序列
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
