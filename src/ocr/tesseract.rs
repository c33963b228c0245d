//! tesseract 命令行识别引擎
//!
//! 图片通过 stdin 传入，以 TSV 格式读取结果：文本取所有单词，置信度取单词置信度的平均值。

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{AppError, RecognitionError};
use crate::ocr::engine::{EngineFactory, RawRecognition, RecognitionProfile, TextRecognizer};

/// tesseract 引擎句柄
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    index: usize,
    baseline: RecognitionProfile,
}

impl TesseractEngine {
    /// 创建引擎并确认可执行文件可用
    pub async fn new(
        binary: impl Into<PathBuf>,
        index: usize,
        baseline: RecognitionProfile,
    ) -> Result<Self> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                AppError::engine_unavailable(index, format!("{}: {}", binary.display(), e))
            })?;
        if !output.status.success() {
            return Err(AppError::engine_unavailable(
                index,
                format!("{} --version 退出码 {:?}", binary.display(), output.status.code()),
            )
            .into());
        }

        let version = String::from_utf8_lossy(&output.stdout);
        debug!(
            "识别引擎 #{} 就绪: {}",
            index,
            version.lines().next().unwrap_or_default().trim()
        );

        Ok(Self {
            binary,
            index,
            baseline,
        })
    }

    fn build_command(&self, profile: &RecognitionProfile) -> Command {
        let effective = profile.merged_over(&self.baseline);

        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin").arg("stdout");
        if let Some(psm) = effective.page_seg_mode {
            cmd.arg("--psm").arg(psm.code().to_string());
        }
        if let Some(oem) = effective.engine_mode {
            cmd.arg("--oem").arg(oem.code().to_string());
        }
        if let Some(whitelist) = &effective.char_whitelist {
            cmd.arg("-c").arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        for (key, value) in &effective.variables {
            cmd.arg("-c").arg(format!("{}={}", key, value));
        }
        cmd.arg("tsv");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TextRecognizer for TesseractEngine {
    async fn recognize(
        &self,
        image: &[u8],
        profile: &RecognitionProfile,
    ) -> Result<RawRecognition> {
        let mut child = self
            .build_command(profile)
            .spawn()
            .with_context(|| format!("启动 tesseract 失败 (引擎 #{})", self.index))?;

        {
            let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
            stdin.write_all(image).await?;
            stdin.shutdown().await.ok();
        }

        let output = child
            .wait_with_output()
            .await
            .context("等待 tesseract 结束失败")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Recognition(RecognitionError::MalformedOutput {
                reason: format!("tesseract 退出码 {:?}: {}", output.status.code(), stderr.trim()),
            })
            .into());
        }

        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// 解析 tesseract 的 TSV 输出
pub fn parse_tsv(tsv: &str) -> Result<RawRecognition> {
    let mut words = Vec::new();
    let mut confidences = Vec::new();

    for line in tsv.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        // level 5 为单词
        if columns[0] != "5" {
            continue;
        }
        let conf: f32 = columns[10].trim().parse().map_err(|_| {
            AppError::Recognition(RecognitionError::MalformedOutput {
                reason: format!("置信度无法解析: {}", columns[10]),
            })
        })?;
        let text = columns[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        words.push(text.to_string());
        confidences.push(conf);
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };

    Ok(RawRecognition {
        text: words.join(" "),
        confidence,
    })
}

/// 为识别池创建 tesseract 引擎
#[derive(Debug, Clone)]
pub struct TesseractFactory {
    binary: PathBuf,
}

impl TesseractFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl EngineFactory for TesseractFactory {
    async fn create(
        &self,
        index: usize,
        baseline: &RecognitionProfile,
    ) -> Result<Arc<dyn TextRecognizer>> {
        let engine = TesseractEngine::new(self.binary.clone(), index, baseline.clone()).await?;
        info!("✅ 识别引擎 {} 初始化完成", index + 1);
        Ok(Arc::new(engine))
    }
}
