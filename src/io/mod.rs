//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `ocr` - HTTP client for the text-recognition engine
//! - `capture` - Camera frame source
//! - `http` - Operator HTTP API
//! - `prometheus` - Prometheus text exposition

pub mod capture;
pub mod http;
pub mod ocr;
pub mod prometheus;

// Re-export commonly used types
pub use capture::{FileFrameSource, FrameSource};
pub use http::{start_api_server, ApiContext};
pub use ocr::{HttpOcrEngine, PlateRecognizer, RecognitionError};
