//! 文字识别能力 - 基础设施层
//!
//! 识别引擎本身由外部提供（例如 tesseract），这里只定义调用契约和参数方案。

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// 验证码允许的字符集
pub const CAPTCHA_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 版面分析模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    /// 单个均匀文本块
    SingleBlock,
    /// 单行文本
    SingleLine,
    /// 单个单词（最快）
    SingleWord,
}

impl PageSegMode {
    pub fn code(self) -> u8 {
        match self {
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SingleWord => 8,
        }
    }
}

/// 识别引擎模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// 仅 LSTM（最快）
    LstmOnly,
    /// 默认
    Default,
}

impl EngineMode {
    pub fn code(self) -> u8 {
        match self {
            EngineMode::LstmOnly => 1,
            EngineMode::Default => 3,
        }
    }
}

/// 识别参数方案
///
/// 未设置的字段在合并时沿用基线方案。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecognitionProfile {
    pub name: String,
    pub char_whitelist: Option<String>,
    pub page_seg_mode: Option<PageSegMode>,
    pub engine_mode: Option<EngineMode>,
    pub variables: BTreeMap<String, String>,
}

impl RecognitionProfile {
    /// 引擎初始化时使用的基线：限定字符集、单词模式、LSTM
    pub fn baseline() -> Self {
        Self {
            name: "baseline".to_string(),
            char_whitelist: Some(CAPTCHA_ALPHABET.to_string()),
            page_seg_mode: Some(PageSegMode::SingleWord),
            engine_mode: Some(EngineMode::LstmOnly),
            variables: vars(&[
                ("preserve_interword_spaces", "0"),
                ("user_defined_dpi", "300"),
                ("tessedit_enable_doc_dict", "0"),
                ("tessedit_enable_dict_correction", "0"),
            ]),
        }
    }

    /// 竞速使用的方案，按从快到慢排列，最后一个是通用兜底
    pub fn race_profiles() -> Vec<Self> {
        vec![
            Self {
                name: "single-word".to_string(),
                char_whitelist: Some(CAPTCHA_ALPHABET.to_string()),
                page_seg_mode: Some(PageSegMode::SingleWord),
                engine_mode: Some(EngineMode::LstmOnly),
                variables: vars(&[
                    ("preserve_interword_spaces", "0"),
                    ("user_defined_dpi", "300"),
                    ("tessedit_enable_doc_dict", "0"),
                    ("tessedit_enable_dict_correction", "0"),
                ]),
            },
            Self {
                name: "single-line".to_string(),
                char_whitelist: Some(CAPTCHA_ALPHABET.to_string()),
                page_seg_mode: Some(PageSegMode::SingleLine),
                engine_mode: Some(EngineMode::LstmOnly),
                variables: vars(&[
                    ("preserve_interword_spaces", "0"),
                    ("user_defined_dpi", "300"),
                ]),
            },
            Self {
                name: "block-fallback".to_string(),
                char_whitelist: Some(CAPTCHA_ALPHABET.to_string()),
                page_seg_mode: Some(PageSegMode::SingleBlock),
                engine_mode: Some(EngineMode::Default),
                variables: BTreeMap::new(),
            },
        ]
    }

    /// 以 `base` 为底合并当前方案
    pub fn merged_over(&self, base: &RecognitionProfile) -> RecognitionProfile {
        let mut variables = base.variables.clone();
        variables.extend(self.variables.clone());
        RecognitionProfile {
            name: if self.name.is_empty() {
                base.name.clone()
            } else {
                self.name.clone()
            },
            char_whitelist: self.char_whitelist.clone().or_else(|| base.char_whitelist.clone()),
            page_seg_mode: self.page_seg_mode.or(base.page_seg_mode),
            engine_mode: self.engine_mode.or(base.engine_mode),
            variables,
        }
    }
}

fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// 引擎原始输出
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecognition {
    pub text: String,
    /// 0-100
    pub confidence: f32,
}

/// 识别引擎句柄
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8], profile: &RecognitionProfile) -> Result<RawRecognition>;

    /// 释放引擎资源
    async fn terminate(&self) -> Result<()> {
        Ok(())
    }
}

/// 识别引擎工厂
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        index: usize,
        baseline: &RecognitionProfile,
    ) -> Result<Arc<dyn TextRecognizer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_base_for_unset_fields() {
        let base = RecognitionProfile::baseline();
        let over = RecognitionProfile {
            name: "line".to_string(),
            page_seg_mode: Some(PageSegMode::SingleLine),
            variables: vars(&[("user_defined_dpi", "150")]),
            ..Default::default()
        };

        let merged = over.merged_over(&base);
        assert_eq!(merged.name, "line");
        assert_eq!(merged.page_seg_mode, Some(PageSegMode::SingleLine));
        assert_eq!(merged.engine_mode, Some(EngineMode::LstmOnly));
        assert_eq!(merged.char_whitelist.as_deref(), Some(CAPTCHA_ALPHABET));
        assert_eq!(merged.variables["user_defined_dpi"], "150");
        assert_eq!(merged.variables["tessedit_enable_doc_dict"], "0");
    }

    #[test]
    fn test_race_profiles_end_with_fallback() {
        let profiles = RecognitionProfile::race_profiles();
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].page_seg_mode, Some(PageSegMode::SingleWord));
        assert_eq!(profiles[2].engine_mode, Some(EngineMode::Default));
    }
}
