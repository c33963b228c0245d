//! 验证码文字识别：引擎契约、tesseract 实现与引擎池

pub mod engine;
pub mod pool;
pub mod tesseract;

pub use engine::{
    EngineFactory, EngineMode, PageSegMode, RawRecognition, RecognitionProfile, TextRecognizer,
    CAPTCHA_ALPHABET,
};
pub use pool::{PoolStats, Recognition, RecognitionPool};
pub use tesseract::{TesseractEngine, TesseractFactory};
