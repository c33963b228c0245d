//! 验证码识别缓存
//!
//! 以图片内容的 SHA-256 为键。超过有效期的条目不再返回；超过容量时先淘汰最早的条目。

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// 缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaCacheEntry {
    pub image_hash: String,
    pub solved_text: String,
    pub confidence: f32,
    pub solved_at: Instant,
}

/// 有界、带有效期的缓存
#[derive(Debug)]
pub struct CaptchaCache {
    entries: HashMap<String, CaptchaCacheEntry>,
    capacity: usize,
    ttl: Duration,
}

impl CaptchaCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn is_live(&self, entry: &CaptchaCacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.solved_at) <= self.ttl
    }

    /// 查询未过期的条目
    pub fn get(&self, image_hash: &str, now: Instant) -> Option<&CaptchaCacheEntry> {
        self.entries
            .get(image_hash)
            .filter(|entry| self.is_live(entry, now))
    }

    /// 写入条目（同一图片重复写入直接覆盖）
    pub fn insert(
        &mut self,
        image_hash: String,
        solved_text: String,
        confidence: f32,
        now: Instant,
    ) {
        self.entries.insert(
            image_hash.clone(),
            CaptchaCacheEntry {
                image_hash,
                solved_text,
                confidence,
                solved_at: now,
            },
        );
        self.evict(now);
    }

    fn evict(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.solved_at) <= ttl);

        if self.entries.len() > self.capacity {
            let mut by_age: Vec<(Instant, String)> = self
                .entries
                .values()
                .map(|e| (e.solved_at, e.image_hash.clone()))
                .collect();
            by_age.sort();
            let overflow = self.entries.len() - self.capacity;
            for (_, hash) in by_age.into_iter().take(overflow) {
                self.entries.remove(&hash);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 图片内容哈希（十六进制）
pub fn image_hash(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}
